use async_trait::async_trait;
use docintel::core::{AnalysisRequest, AnalysisResult, Analyzer, ModelKind};
use docintel::domain::model::{FieldType, KeyValuePair, Page, Word};
use docintel::{AppConfig, LocalStorage, Mode, Result, Shell};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Clone, Default)]
struct FakeAnalyzer {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut result = AnalysisResult {
            model_id: request.model.model_id().to_string(),
            content: "Vendor: Contoso Total: 42.00".to_string(),
            raw: serde_json::json!({"modelId": request.model.model_id()}),
            ..Default::default()
        };
        match request.model {
            ModelKind::GeneralDocument => {
                result.key_value_pairs = vec![KeyValuePair {
                    key: Some("Vendor:".to_string()),
                    value: Some("Contoso".to_string()),
                    confidence: Some(0.9),
                }];
            }
            _ => {
                result.pages = vec![Page {
                    page_number: 1,
                    words: vec![Word {
                        content: "42.00".to_string(),
                        polygon: vec![1.0, 1.0, 2.0, 1.0, 2.0, 2.0, 1.0, 2.0],
                        confidence: Some(0.99),
                    }],
                }];
            }
        }
        Ok(result)
    }
}

struct Fixture {
    temp_dir: TempDir,
    analyzer: FakeAnalyzer,
    shell: Shell<FakeAnalyzer, LocalStorage>,
}

fn fixture() -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let config = AppConfig {
        data_dir: temp_dir.path().to_str().unwrap().to_string(),
        ..Default::default()
    };
    let analyzer = FakeAnalyzer::default();
    let storage = LocalStorage::new(config.data_dir.clone());
    let shell = Shell::new(analyzer.clone(), storage, &config);
    Fixture {
        temp_dir,
        analyzer,
        shell,
    }
}

async fn run_script(shell: &mut Shell<FakeAnalyzer, LocalStorage>, script: &str) -> String {
    let mut out = Vec::new();
    shell.run(Cursor::new(script.to_string()), &mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_prebuilt_analyze_and_export() {
    let mut fx = fixture();
    let invoice = fx.temp_dir.path().join("invoice1.pdf");
    std::fs::write(&invoice, b"%PDF").unwrap();

    let script = format!(
        "model invoice\nanalyze {}\nexport text\nexport markdown\nexport json\nquit\n",
        invoice.display()
    );
    let output = run_script(&mut fx.shell, &script).await;

    assert!(output.contains("[prebuilt:prebuilt-invoice]> "));
    assert!(output.contains("✅ Analysis complete!"));
    assert!(output.contains("📁 Saved exports/invoice1_text.txt"));
    assert_eq!(fx.analyzer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.shell.last_result().unwrap().model_id, "prebuilt-invoice");

    let text =
        std::fs::read_to_string(fx.temp_dir.path().join("exports/invoice1_text.txt")).unwrap();
    assert_eq!(text, "Vendor: Contoso Total: 42.00");
    assert!(fx.temp_dir.path().join("exports/invoice1_raw.json").exists());
    let markdown =
        std::fs::read_to_string(fx.temp_dir.path().join("exports/invoice1_text.md")).unwrap();
    assert_eq!(markdown, "\n### Page 1:\n42.00\n");
}

#[tokio::test]
async fn test_failed_commands_keep_the_session_alive() {
    let mut fx = fixture();
    let output = run_script(
        &mut fx.shell,
        "analyze notes.txt\nmodel nonsense\nopen x.pdf\nbogus\nstatus\n",
    )
    .await;

    assert_eq!(output.matches("❌").count(), 4);
    assert!(output.contains("💡"));
    assert!(output.contains("Mode: Pre-built Analysis"));
    assert_eq!(fx.analyzer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_custom_labeling_session() {
    let mut fx = fixture();
    let invoice = fx.temp_dir.path().join("invoice1.pdf");
    std::fs::write(&invoice, b"%PDF").unwrap();

    let script = format!(
        "mode custom\n\
         field add Vendor\n\
         field add Total : currency\n\
         fields save\n\
         open {}\n\
         set Total = 42.00\n\
         save\n\
         records\n\
         quit\n",
        invoice.display()
    );
    let output = run_script(&mut fx.shell, &script).await;

    assert_eq!(fx.shell.mode(), Mode::Custom);
    assert!(output.contains("[custom]> "));
    assert!(output.contains("Vendor (Sugg [Doc] Conf:0.90): \"Contoso\""));
    assert!(output.contains("✅ OCR ref saved: ocr/invoice1.ocr.json"));
    assert!(output.contains("ℹ️ 'Vendor'"));
    assert!(output.contains("✅ Labels SAVED/OVERWRITTEN: labels/invoice1.labels.json"));
    assert!(output.contains("  invoice1"));
    assert_eq!(fx.analyzer.calls.load(Ordering::SeqCst), 2);

    let labels: serde_json::Value = serde_json::from_slice(
        &std::fs::read(fx.temp_dir.path().join("labels/invoice1.labels.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(labels["fields"]["Total"]["fieldType"], "currency");
    assert!(fx.temp_dir.path().join("fields.json").exists());

    // reopening the same file uses the cache and the saved labels
    let output = run_script(&mut fx.shell, &format!("open {}\n", invoice.display())).await;
    assert!(output.contains("📁 Loaded existing labels for 'invoice1'"));
    assert!(output.contains("Total (Using existing label): \"42.00\""));
    assert_eq!(fx.analyzer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_field_names_ending_in_type_words_stay_intact() {
    let mut fx = fixture();
    let output = run_script(
        &mut fx.shell,
        "mode custom\n\
         field add Invoice Date\n\
         field add Invoice Number\n\
         field add Phone Number : phoneNumber\n\
         field add Invoice Date\n\
         fields\n",
    )
    .await;

    let fields: Vec<(String, FieldType)> = fx
        .shell
        .labeling()
        .fields()
        .fields()
        .iter()
        .map(|f| (f.field_key.clone(), f.field_type))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("Invoice Date".to_string(), FieldType::String),
            ("Invoice Number".to_string(), FieldType::String),
            ("Phone Number".to_string(), FieldType::PhoneNumber),
        ]
    );
    assert!(output.contains("Added 'Invoice Date' (string)."));
    assert_eq!(output.matches("❌").count(), 1);
    assert!(output.contains("  3. Phone Number (phoneNumber)"));
}

#[tokio::test]
async fn test_rename_after_open_keeps_entered_value() {
    let mut fx = fixture();
    let invoice = fx.temp_dir.path().join("invoice1.pdf");
    std::fs::write(&invoice, b"%PDF").unwrap();

    let script = format!(
        "mode custom\n\
         field add Total : currency\n\
         open {}\n\
         set Total = 42.00\n\
         field rename 1 Amount Due\n\
         values\n\
         save\n",
        invoice.display()
    );
    let output = run_script(&mut fx.shell, &script).await;

    assert!(output.contains("Renamed field 1 to 'Amount Due'."));
    assert!(output.contains("  Amount Due (No suggestion / No existing): \"42.00\""));
    let labels: serde_json::Value = serde_json::from_slice(
        &std::fs::read(fx.temp_dir.path().join("labels/invoice1.labels.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(labels["labels"][0]["label"], "Amount Due");
    assert_eq!(labels["labels"][0]["value"][0]["text"], "42.00");
}
