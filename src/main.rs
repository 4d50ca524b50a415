use clap::Parser;
use docintel::core::ConfigProvider;
use docintel::utils::{logger, validation::Validate};
use docintel::{AppConfig, AzureAnalyzer, LocalStorage, Shell};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 先載入 .env，環境變數才能被 clap 讀到
    let _ = dotenvy::dotenv();
    let config = AppConfig::parse();

    if config.log_json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting docintel session");
    if config.verbose {
        tracing::debug!("Config: {:?}", config);
    }

    // 啟動時的設定錯誤是唯一會結束程式的錯誤
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let analyzer = match AzureAnalyzer::new(&config) {
        Ok(analyzer) => analyzer,
        Err(e) => {
            tracing::error!("❌ Error initializing Azure client: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    let storage = LocalStorage::new(config.data_dir.clone());
    if let Err(e) = storage.ensure_dirs(&[config.ocr_dir(), config.labels_dir()]) {
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(1);
    }
    tracing::info!("📁 Data directory: {}", config.data_dir);

    let mut shell = Shell::new(analyzer, storage, &config);
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    shell.run(stdin.lock(), &mut stdout).await?;

    tracing::info!("Session closed");
    Ok(())
}
