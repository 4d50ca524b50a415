use crate::core::labeling::{LabelStore, LabelingSession};
use crate::core::matching::document_id;
use crate::core::prebuilt::{analyze_upload, export_result, ExportKind};
use crate::core::render::render_result;
use crate::core::{Analyzer, ConfigProvider, Storage};
use crate::domain::model::{
    AnalysisResult, FieldType, ModelKind, UploadedFile, READ_LOCALES, SUPPORTED_EXTENSIONS,
};
use crate::utils::error::{DocIntelError, Result};
use crate::utils::validation::validate_file_extension;
use std::io::{BufRead, Write};

const HELP: &str = "\
Commands:
  mode prebuilt|custom        switch between Pre-built Analysis and Custom Model Training
  status                      show the current mode, model and labeling state
  help                        show this help
  quit                        leave the session

Pre-built Analysis:
  model <kind>                read, layout, document, invoice, receipt, id, businesscard
  locale <auto|en|ar|...>     document language (Read model only)
  analyze <path>              upload a file and analyze it with the selected model
  show [raw]                  show the last result again, optionally with raw JSON
  export text|markdown|tables|json
                              save part of the last result under the export directory

Custom Model Training:
  fields                      list defined fields
  field add <name> [: <type>] add a field (default type: string)
  field rename <n> <name>     rename field number n
  field type <n> <type>       change the type of field number n
  field rm <n>                remove field number n
  fields save                 write field definitions to disk
  open <path>                 upload a document, analyze it and prefill values
  values                      show the values entered for the open document
  set <field> = <value>       enter a value (empty is allowed)
  save                        save labels for the open document (overwrites)
  records                     list labeled documents";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Prebuilt,
    Custom,
}

impl Mode {
    pub fn title(&self) -> &'static str {
        match self {
            Mode::Prebuilt => "Pre-built Analysis",
            Mode::Custom => "Custom Model Training",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// One interactive session. All state that a UI framework would keep
/// globally lives here and is passed to the handlers explicitly.
pub struct Shell<A: Analyzer, S: Storage + Clone> {
    analyzer: A,
    storage: S,
    export_dir: String,
    mode: Mode,
    model: ModelKind,
    locale: Option<String>,
    last: Option<(String, AnalysisResult)>,
    labeling: LabelingSession<S>,
}

impl<A: Analyzer, S: Storage + Clone> Shell<A, S> {
    pub fn new<C: ConfigProvider>(analyzer: A, storage: S, config: &C) -> Self {
        let store = LabelStore::from_config(storage.clone(), config);
        Self {
            analyzer,
            storage,
            export_dir: config.export_dir().to_string(),
            mode: Mode::Prebuilt,
            model: ModelKind::Read,
            locale: None,
            last: None,
            labeling: LabelingSession::new(store, config.fields_file()),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn labeling(&self) -> &LabelingSession<S> {
        &self.labeling
    }

    pub fn last_result(&self) -> Option<&AnalysisResult> {
        self.last.as_ref().map(|(_, r)| r)
    }

    /// 逐行讀取指令直到 quit 或 EOF；單一指令失敗不會結束 session
    pub async fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        writeln!(out, "Azure Document Intelligence. Type 'help' for commands.")?;
        self.prompt(out)?;

        for line in input.lines() {
            let line = line?;
            match self.execute(&line, out).await {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => {
                    tracing::debug!(
                        "Command failed (Category: {:?}, Severity: {:?}): {}",
                        e.category(),
                        e.severity(),
                        e
                    );
                    writeln!(out, "❌ {}", e.user_friendly_message())?;
                    writeln!(out, "💡 {}", e.recovery_suggestion())?;
                }
            }
            self.prompt(out)?;
        }

        writeln!(out)?;
        Ok(())
    }

    fn prompt<W: Write>(&self, out: &mut W) -> Result<()> {
        let tag = match self.mode {
            Mode::Prebuilt => format!("prebuilt:{}", self.model.model_id()),
            Mode::Custom => "custom".to_string(),
        };
        write!(out, "[{}]> ", tag)?;
        out.flush()?;
        Ok(())
    }

    async fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Flow> {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "help" | "?" => writeln!(out, "{}", HELP)?,
            "quit" | "exit" => return Ok(Flow::Quit),
            "status" => self.status(out)?,
            "mode" => self.switch_mode(rest, out).await?,
            "model" => {
                self.require(Mode::Prebuilt)?;
                self.model = rest.parse()?;
                writeln!(out, "Service: {} ({})", self.model, self.model.model_id())?;
            }
            "locale" => {
                self.require(Mode::Prebuilt)?;
                self.set_locale(rest, out)?;
            }
            "analyze" => {
                self.require(Mode::Prebuilt)?;
                self.analyze(rest, out).await?;
            }
            "show" => {
                self.require(Mode::Prebuilt)?;
                let (_, result) = self.last.as_ref().ok_or_else(no_result)?;
                let title = self.model.display_name();
                writeln!(out, "{}", render_result(result, title, rest == "raw"))?;
            }
            "export" => {
                self.require(Mode::Prebuilt)?;
                let kind: ExportKind = rest.parse()?;
                let (stem, result) = self.last.as_ref().ok_or_else(no_result)?;
                let paths =
                    export_result(&self.storage, &self.export_dir, stem, result, kind).await?;
                for path in paths {
                    writeln!(out, "📁 Saved {}", path)?;
                }
            }
            "fields" => {
                self.require(Mode::Custom)?;
                if rest == "save" {
                    self.labeling.save_fields().await?;
                    writeln!(out, "✅ Fields saved!")?;
                } else {
                    self.list_fields(out)?;
                }
            }
            "field" => {
                self.require(Mode::Custom)?;
                self.edit_field(rest, out)?;
            }
            "open" => {
                self.require(Mode::Custom)?;
                self.open(rest, out).await?;
            }
            "values" => {
                self.require(Mode::Custom)?;
                self.show_values(out)?;
            }
            "set" => {
                self.require(Mode::Custom)?;
                let (field, value) = match rest.split_once('=') {
                    Some((f, v)) => (f.trim(), v.trim()),
                    None => match rest.split_once(char::is_whitespace) {
                        Some((f, v)) => (f, v.trim()),
                        None => (rest, ""),
                    },
                };
                self.labeling.set_value(field, value)?;
                writeln!(out, "{} = {:?}", field, value)?;
            }
            "save" => {
                self.require(Mode::Custom)?;
                let outcome = self.labeling.save().await?;
                writeln!(out, "✅ OCR ref saved: {}", outcome.ocr_path)?;
                for field in &outcome.unlocated {
                    writeln!(
                        out,
                        "ℹ️ '{}': no exact match in Layout words, saved text only",
                        field
                    )?;
                }
                writeln!(out, "✅ Labels SAVED/OVERWRITTEN: {}", outcome.labels_path)?;
            }
            "records" => {
                self.require(Mode::Custom)?;
                let records = self.labeling.store().list().await?;
                if records.is_empty() {
                    writeln!(out, "No labeled documents yet.")?;
                }
                for id in records {
                    writeln!(out, "  {}", id)?;
                }
            }
            other => {
                return Err(DocIntelError::ValidationError {
                    message: format!("Unknown command '{}'. Type 'help'", other),
                })
            }
        }
        Ok(Flow::Continue)
    }

    fn require(&self, mode: Mode) -> Result<()> {
        if self.mode != mode {
            let target = match mode {
                Mode::Prebuilt => "prebuilt",
                Mode::Custom => "custom",
            };
            return Err(DocIntelError::ValidationError {
                message: format!(
                    "This command belongs to {} mode (use 'mode {}')",
                    mode.title(),
                    target
                ),
            });
        }
        Ok(())
    }

    fn status<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "Mode: {}", self.mode.title())?;
        writeln!(out, "Service: {} ({})", self.model, self.model.model_id())?;
        writeln!(out, "Locale: {}", self.locale.as_deref().unwrap_or("auto"))?;
        writeln!(out, "Fields: {}", self.labeling.fields().len())?;
        writeln!(out, "Labeling: {:?}", self.labeling.state())?;
        if let Some(doc) = self.labeling.current() {
            writeln!(out, "Document: {}", doc.file_name)?;
        }
        Ok(())
    }

    async fn switch_mode<W: Write>(&mut self, arg: &str, out: &mut W) -> Result<()> {
        let mode = match arg.to_ascii_lowercase().as_str() {
            "prebuilt" | "pre-built" | "analysis" => Mode::Prebuilt,
            "custom" | "training" | "label" => Mode::Custom,
            _ => {
                return Err(DocIntelError::ValidationError {
                    message: "Use 'mode prebuilt' or 'mode custom'".to_string(),
                })
            }
        };

        // 進入自訂模式時從磁碟載入欄位設定
        if mode == Mode::Custom && self.mode != Mode::Custom {
            self.labeling.reload_fields().await;
        }
        self.mode = mode;
        tracing::info!("Mode: {}", mode.title());
        writeln!(out, "Mode: {}", mode.title())?;
        if mode == Mode::Custom && self.labeling.fields().is_empty() {
            writeln!(out, "No fields defined. Add some with 'field add <name> [: <type>]'.")?;
        }
        Ok(())
    }

    fn set_locale<W: Write>(&mut self, arg: &str, out: &mut W) -> Result<()> {
        if arg.is_empty() || arg.eq_ignore_ascii_case("auto") {
            self.locale = None;
        } else if let Some(locale) = READ_LOCALES.iter().find(|l| l.eq_ignore_ascii_case(arg)) {
            self.locale = Some(locale.to_string());
        } else {
            return Err(DocIntelError::ValidationError {
                message: format!(
                    "Unknown locale '{}'. Choose auto or one of: {}",
                    arg,
                    READ_LOCALES.join(", ")
                ),
            });
        }
        if self.model != ModelKind::Read && self.locale.is_some() {
            writeln!(out, "Note: the locale only applies to the Read model")?;
        }
        writeln!(out, "Locale: {}", self.locale.as_deref().unwrap_or("auto"))?;
        Ok(())
    }

    async fn analyze<W: Write>(&mut self, path: &str, out: &mut W) -> Result<()> {
        let upload = read_upload(path)?;
        writeln!(
            out,
            "Analyzing '{}' with '{}'...",
            upload.name,
            self.model.display_name()
        )?;
        let result = analyze_upload(
            &self.analyzer,
            &upload,
            self.model,
            self.locale.as_deref(),
        )
        .await?;
        writeln!(out, "✅ Analysis complete!")?;
        writeln!(
            out,
            "{}",
            render_result(&result, self.model.display_name(), false)
        )?;
        self.last = Some((document_id(&upload.name), result));
        Ok(())
    }

    fn list_fields<W: Write>(&self, out: &mut W) -> Result<()> {
        let fields = self.labeling.fields().fields();
        if fields.is_empty() {
            writeln!(out, "No fields defined.")?;
        }
        for (i, field) in fields.iter().enumerate() {
            writeln!(out, "  {}. {} ({})", i + 1, field.field_key, field.field_type)?;
        }
        Ok(())
    }

    fn edit_field<W: Write>(&mut self, args: &str, out: &mut W) -> Result<()> {
        let (action, rest) = match args.split_once(char::is_whitespace) {
            Some((a, r)) => (a, r.trim()),
            None => (args, ""),
        };

        match action {
            "add" => {
                let (name, field_type) = split_name_and_type(rest)?;
                let added = self.labeling.fields_mut().add(name, field_type)?;
                writeln!(out, "Added '{}' ({}).", added.field_key, added.field_type)?;
            }
            "rename" => {
                let (index, name) = split_index(rest)?;
                let renamed = self.labeling.rename_field(index, name)?;
                writeln!(out, "Renamed field {} to '{}'.", index + 1, renamed)?;
            }
            "type" => {
                let (index, type_name) = split_index(rest)?;
                let field_type: FieldType = type_name.parse()?;
                self.labeling.fields_mut().set_type(index, field_type)?;
                writeln!(out, "Field {} is now {}.", index + 1, field_type)?;
            }
            "rm" | "remove" => {
                let (index, _) = split_index(rest)?;
                let removed = self.labeling.fields_mut().remove(index)?;
                writeln!(out, "Removed '{}'.", removed.field_key)?;
            }
            other => {
                return Err(DocIntelError::ValidationError {
                    message: format!("Unknown field action '{}'. Use add, rename, type or rm", other),
                })
            }
        }
        Ok(())
    }

    async fn open<W: Write>(&mut self, path: &str, out: &mut W) -> Result<()> {
        if self.labeling.fields().is_empty() {
            return Err(DocIntelError::ValidationError {
                message: "Define fields first ('field add <name> [: <type>]')".to_string(),
            });
        }
        let upload = read_upload(path)?;
        writeln!(out, "Analyzing {} (Layout & General Document)...", upload.name)?;
        let doc = self.labeling.load_document(&self.analyzer, &upload).await?;
        if doc.had_existing_labels {
            writeln!(out, "📁 Loaded existing labels for '{}'", doc.document_id)?;
        }
        writeln!(out, "✅ Analysis complete.")?;
        self.show_values(out)
    }

    fn show_values<W: Write>(&self, out: &mut W) -> Result<()> {
        let doc = self
            .labeling
            .current()
            .ok_or_else(|| DocIntelError::ValidationError {
                message: "Open a document first ('open <path>')".to_string(),
            })?;
        writeln!(out, "Verify / Enter Field Values for {}", doc.file_name)?;
        for field in self.labeling.fields().fields() {
            let value = doc
                .values
                .get(&field.field_key)
                .map(String::as_str)
                .unwrap_or("");
            let note = doc
                .suggestions
                .get(&field.field_key)
                .map(|s| s.describe())
                .unwrap_or_else(|| "(No suggestion / No existing)".to_string());
            writeln!(out, "  {} {}: {:?}", field.field_key, note, value)?;
        }
        Ok(())
    }
}

fn no_result() -> DocIntelError {
    DocIntelError::ValidationError {
        message: "Nothing analyzed yet ('analyze <path>')".to_string(),
    }
}

fn read_upload(path: &str) -> Result<UploadedFile> {
    if path.is_empty() {
        return Err(DocIntelError::ValidationError {
            message: "A file path is required".to_string(),
        });
    }
    // 先檢查副檔名再讀檔，不支援的格式不會進到後續流程
    validate_file_extension(path, SUPPORTED_EXTENSIONS)?;
    UploadedFile::from_path(path)
}

/// `<name>` or `<name> : <type>`; without a separator the whole text is the name.
fn split_name_and_type(args: &str) -> Result<(&str, FieldType)> {
    match args.rsplit_once(':') {
        Some((name, type_name)) => Ok((name.trim(), type_name.parse()?)),
        None => Ok((args.trim(), FieldType::String)),
    }
}

fn split_index(args: &str) -> Result<(usize, &str)> {
    let (index, rest) = match args.split_once(char::is_whitespace) {
        Some((i, r)) => (i, r.trim()),
        None => (args, ""),
    };
    let number: usize = index.parse().map_err(|_| DocIntelError::ValidationError {
        message: format!("Expected a field number, got '{}'", index),
    })?;
    if number == 0 {
        return Err(DocIntelError::ValidationError {
            message: "Field numbers start at 1".to_string(),
        });
    }
    Ok((number - 1, rest))
}
