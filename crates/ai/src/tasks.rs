// The three reasoning-service tasks: build the prompt, call the service with
// the task's sampling settings, and post-process the response.

use sheetwise_config::AISettings;
use sheetwise_engine::dataset::ByColumn;
use sheetwise_engine::stats::{BasicStats, CategoricalSummary, NumericSummary};
use sheetwise_engine::Dataset;

use crate::client::{ChatRequest, ReasoningService, ServiceError};
use crate::extract::{extract, extract_code_block, ExtractionResult, Markers};
use crate::prompts::{
    report_prompt, transform_prompt, visualization_prompt, REPORT_SYSTEM, TRANSFORM_SYSTEM,
    VISUALIZATION_SYSTEM,
};

/// Inputs of an instruction-driven transform.
pub struct TransformTask<'a> {
    pub dataset: &'a Dataset,
    pub instruction: &'a str,
    pub numeric: &'a ByColumn<NumericSummary>,
    pub categorical: &'a ByColumn<CategoricalSummary>,
    pub markers: &'a Markers,
    pub preview_rows: usize,
    pub max_rows: usize,
}

/// Ask the service to apply `instruction` and extract the resulting rows.
///
/// A service failure is an error; an unparseable response is an
/// unsuccessful [`ExtractionResult`] carrying whatever explanation survived.
pub fn run_transform(
    service: &dyn ReasoningService,
    task: &TransformTask<'_>,
    ai: &AISettings,
) -> Result<ExtractionResult, ServiceError> {
    let request = ChatRequest {
        system: TRANSFORM_SYSTEM.to_string(),
        user: transform_prompt(
            task.dataset,
            task.instruction,
            task.markers,
            task.numeric,
            task.categorical,
            task.preview_rows,
        ),
        temperature: ai.transform_temperature,
        max_tokens: ai.transform_max_tokens,
    };

    let response = service.complete(&request)?;
    log::debug!("transform response: {} chars", response.len());

    let result = extract(&response, task.markers, task.max_rows);
    match result.strategy {
        Some(strategy) => log::info!("extracted {} rows via {:?}", result.rows.len(), strategy),
        None => log::warn!("no structured result in transform response"),
    }
    Ok(result)
}

/// Written analysis report. A failed call yields the error text as the report.
pub fn generate_report(
    service: &dyn ReasoningService,
    dataset: &Dataset,
    basic: &BasicStats,
    numeric: &ByColumn<NumericSummary>,
    categorical: &ByColumn<CategoricalSummary>,
    ai: &AISettings,
) -> String {
    let request = ChatRequest {
        system: REPORT_SYSTEM.to_string(),
        user: report_prompt(dataset, basic, numeric, categorical),
        temperature: ai.report_temperature,
        max_tokens: ai.report_max_tokens,
    };

    match service.complete(&request) {
        Ok(report) => report,
        Err(e) => {
            log::error!("report generation failed: {}", e);
            format!("Error generating analysis report: {}", e)
        }
    }
}

/// Lua chart code for up to `max_routines` plot routines.
pub fn generate_chart_code(
    service: &dyn ReasoningService,
    dataset: &Dataset,
    numeric: &ByColumn<NumericSummary>,
    categorical: &ByColumn<CategoricalSummary>,
    max_routines: usize,
    ai: &AISettings,
) -> Result<String, ServiceError> {
    let request = ChatRequest {
        system: VISUALIZATION_SYSTEM.to_string(),
        user: visualization_prompt(dataset, numeric, categorical, max_routines),
        temperature: ai.visualization_temperature,
        max_tokens: ai.visualization_max_tokens,
    };

    let response = service.complete(&request)?;
    Ok(extract_code_block(&response, "lua"))
}
