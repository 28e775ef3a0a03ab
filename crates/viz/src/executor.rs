//! Run generated chart code against a dataset and collect PNG images.
//!
//! The code is repaired, loaded into a [`Sandbox`], and each `plotN`
//! routine is executed on its own figure. A failing routine is logged and
//! skipped; the run succeeds when at least one image was produced.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use sheetwise_engine::Dataset;

use crate::render::{render_png, RenderOptions, DEFAULT_FONT_PATHS};
use crate::repair::{inject_font_shim, repair_column_refs, repair_indentation, ColumnRepair};
use crate::sandbox::{Limits, Sandbox, SandboxError, DEFAULT_TIMEOUT, INSTRUCTION_LIMIT};

pub const DEFAULT_MAX_ROUTINES: usize = 5;

#[derive(Debug, Clone)]
pub struct VizOptions {
    /// Highest `plotN` index looked up
    pub max_routines: usize,
    pub width: u32,
    pub height: u32,
    pub instruction_limit: u64,
    pub timeout: Duration,
    pub font_paths: Vec<PathBuf>,
}

impl Default for VizOptions {
    fn default() -> Self {
        Self {
            max_routines: DEFAULT_MAX_ROUTINES,
            width: 1000,
            height: 600,
            instruction_limit: INSTRUCTION_LIMIT,
            timeout: DEFAULT_TIMEOUT,
            font_paths: DEFAULT_FONT_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl VizOptions {
    fn limits(&self) -> Limits {
        Limits {
            instruction_limit: self.instruction_limit,
            timeout: self.timeout,
        }
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            width: self.width,
            height: self.height,
            font_paths: self.font_paths.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageOutput {
    /// `N` of the `plotN` routine that drew it
    pub index: usize,
    pub base64: String,
    pub file_name: String,
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutineFailure {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationResult {
    pub success: bool,
    pub images: Vec<ImageOutput>,
    /// The code as executed, after repairs
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub repairs: Vec<ColumnRepair>,
    pub failures: Vec<RoutineFailure>,
}

impl VisualizationResult {
    fn failed(code: String, error: String, repairs: Vec<ColumnRepair>) -> Self {
        Self {
            success: false,
            images: Vec::new(),
            code,
            error: Some(error),
            repairs,
            failures: Vec::new(),
        }
    }
}

/// Repaired code plus the column substitutions that were made.
pub fn prepare(code: &str, dataset: &Dataset) -> (String, Vec<ColumnRepair>) {
    let indented = repair_indentation(code);
    repair_column_refs(&indented, dataset)
}

/// Execute `code` and write `plot_<N>.png` files into `images_dir`.
pub fn execute(code: &str, dataset: &Dataset, images_dir: &Path, opts: &VizOptions) -> VisualizationResult {
    let (fixed, repairs) = prepare(code, dataset);
    let runnable = inject_font_shim(&fixed);

    let sandbox = match Sandbox::new(dataset, opts.limits()) {
        Ok(sb) => sb,
        Err(e) => return VisualizationResult::failed(code.to_string(), e.to_string(), repairs),
    };
    if let Err(e) = sandbox.load(&runnable) {
        log::warn!("chart code failed to load: {}", e);
        return VisualizationResult::failed(code.to_string(), e.to_string(), repairs);
    }

    let routines = sandbox.routines(opts.max_routines);
    if routines.is_empty() {
        return VisualizationResult::failed(
            fixed,
            format!("no plot routines found (expected plot1..plot{})", opts.max_routines),
            repairs,
        );
    }

    if let Err(e) = fs::create_dir_all(images_dir) {
        return VisualizationResult::failed(
            fixed,
            format!("Failed to create {}: {}", images_dir.display(), e),
            repairs,
        );
    }

    let render_opts = opts.render_options();
    let mut images = Vec::new();
    let mut failures = Vec::new();
    for (index, routine) in &routines {
        match run_one(&sandbox, routine, dataset, *index, images_dir, &render_opts) {
            Ok(image) => images.push(image),
            Err(error) => {
                log::warn!("plot{} failed: {}", index, error);
                failures.push(RoutineFailure { index: *index, error });
            }
        }
    }
    for line in sandbox.output() {
        log::debug!("chart code: {}", line);
    }

    log::info!(
        "visualization: {} of {} routines produced images",
        images.len(),
        routines.len()
    );

    let error = images
        .is_empty()
        .then(|| "no chart was produced by any plot routine".to_string());
    VisualizationResult {
        success: !images.is_empty(),
        images,
        code: fixed,
        error,
        repairs,
        failures,
    }
}

fn run_one(
    sandbox: &Sandbox,
    routine: &mlua::Function,
    dataset: &Dataset,
    index: usize,
    images_dir: &Path,
    render_opts: &RenderOptions,
) -> Result<ImageOutput, String> {
    let figure = sandbox
        .run_routine(routine, dataset)
        .map_err(|e: SandboxError| e.to_string())?;
    let png = render_png(&figure, render_opts).map_err(|e| e.to_string())?;

    let file_name = format!("plot_{}.png", index);
    let path = images_dir.join(&file_name);
    fs::write(&path, &png).map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

    Ok(ImageOutput {
        index,
        base64: STANDARD.encode(&png),
        file_name,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetwise_engine::Value;

    fn dataset() -> Dataset {
        Dataset::new(
            vec!["region".into(), "sales".into(), "cost".into()],
            vec![
                vec!["North".into(), Value::Int(10), Value::Float(4.5)],
                vec!["South".into(), Value::Int(20), Value::Null],
                vec!["North".into(), Value::Int(5), Value::Float(2.0)],
            ],
        )
    }

    fn options() -> VizOptions {
        VizOptions {
            width: 320,
            height: 240,
            font_paths: Vec::new(),
            ..VizOptions::default()
        }
    }

    const FIVE_ROUTINES: &str = r#"
function plot1(df)
plt.title("Sales by region")
    local labels, totals = stats.group_sum(df["region"], df["sales"])
    plt.bar(labels, totals)
end

function plot2(df)
    plt.hist(stats.numbers(df["cost"]), 5)
end

function plot3(df)
    plt.scatter(df["sales"], df["cost"])
end

function plot4(df)
    error("cannot draw this")
end

function plot5(df)
    local labels, counts = stats.counts(df["region"])
    plt.pie(counts, labels)
end
"#;

    #[test]
    fn test_execute_collects_images_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let result = execute(FIVE_ROUTINES, &dataset(), dir.path(), &options());

        assert!(result.success);
        assert!(result.error.is_none());
        let indices: Vec<usize> = result.images.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 5]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].index, 4);
        assert!(result.failures[0].error.contains("cannot draw this"));

        assert!(dir.path().join("plot_1.png").exists());
        assert!(!dir.path().join("plot_4.png").exists());
        assert!(!result.images[0].base64.is_empty());

        // Indentation was repaired; the font prologue is not part of the returned code
        assert!(result.code.contains("    plt.title(\"Sales by region\")"));
        assert!(!result.code.contains("font.sans-serif"));
    }

    #[test]
    fn test_missing_column_is_substituted() {
        let dir = tempfile::tempdir().unwrap();
        let code = "function plot1(df)\n    plt.plot(df[\"revenue\"])\nend";
        let result = execute(code, &dataset(), dir.path(), &options());
        assert!(result.success);
        assert_eq!(result.repairs.len(), 1);
        assert_eq!(result.repairs[0].replacement, "sales");
        assert!(result.code.contains("df[\"sales\"]"));
    }

    #[test]
    fn test_no_routines_is_failure_with_code() {
        let dir = tempfile::tempdir().unwrap();
        let code = "local x = 1";
        let result = execute(code, &dataset(), dir.path(), &options());
        assert!(!result.success);
        assert!(result.images.is_empty());
        assert_eq!(result.code, code);
        assert!(result.error.unwrap().contains("no plot routines"));
    }

    #[test]
    fn test_routine_with_only_labels_yields_image() {
        let dir = tempfile::tempdir().unwrap();
        let code = "function plot1(df)\n    plt.title(\"t\")\n    plt.xlabel(\"x\")\nend";
        let result = execute(code, &dataset(), dir.path(), &options());
        assert!(result.success);
        assert_eq!(result.images.len(), 1);
        assert!(result.failures.is_empty());
        assert!(dir.path().join("plot_1.png").exists());
    }

    #[test]
    fn test_failed_routine_cannot_break_later_ones() {
        let dir = tempfile::tempdir().unwrap();
        let code = "function plot1(df)\n    stats = stats.numbers(df[\"sales\"])\n    error(\"bad\")\nend\n\
                    function plot2(df)\n    plt.hist(stats.numbers(df[\"sales\"]), 2)\nend";
        let result = execute(code, &dataset(), dir.path(), &options());
        assert!(result.success);
        assert_eq!(result.images.len(), 1);
        assert_eq!(result.images[0].index, 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].index, 1);
        assert!(result.failures[0].error.contains("bad"));
        assert!(!result.failures[0].error.contains("stack traceback"));
    }

    #[test]
    fn test_syntax_error_returns_original_code() {
        let dir = tempfile::tempdir().unwrap();
        let code = "function plot1(df)\n    plt.bar(\nend";
        let result = execute(code, &dataset(), dir.path(), &options());
        assert!(!result.success);
        assert_eq!(result.code, code);
        assert!(result.error.unwrap().starts_with("syntax error"));
    }

    #[test]
    fn test_runaway_code_is_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let opts = VizOptions {
            instruction_limit: 200_000,
            ..options()
        };
        let code = "function plot1(df)\n    while true do end\nend\nfunction plot2(df)\n    plt.plot({1, 2})\nend";
        let result = execute(code, &dataset(), dir.path(), &opts);
        assert!(result.success);
        assert_eq!(result.images.len(), 1);
        assert!(result.failures[0].error.contains("instruction limit"));
    }

    #[test]
    fn test_sandbox_blocks_os_access() {
        let dir = tempfile::tempdir().unwrap();
        let code = "function plot1(df)\n    os.execute(\"echo hi\")\nend";
        let result = execute(code, &dataset(), dir.path(), &options());
        assert!(!result.success);
        assert_eq!(result.failures.len(), 1);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = VisualizationResult::failed("c".into(), "e".into(), Vec::new());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "c");
        assert_eq!(json["error"], "e");
        assert!(json.get("images").unwrap().as_array().unwrap().is_empty());
    }
}
