// End-to-end runs of the service handlers against real files, with a scripted
// reasoning service standing in for the network.

use std::fs;
use std::path::Path;

use rust_xlsxwriter::{Format, Workbook};
use serde_json::{json, Value};

use sheetwise_ai::prompts::{REPORT_SYSTEM, TRANSFORM_SYSTEM, VISUALIZATION_SYSTEM};
use sheetwise_ai::{ChatRequest, ReasoningService, ServiceError};
use sheetwise_cli::Service;
use sheetwise_config::Settings;
use sheetwise_core::MemoryStore;

/// Answers by task, recognized from the system prompt.
struct Scripted;

const TRANSFORM_REPLY: &str = "=== EXPLANATION ===
Kept the rows whose Total is above 100 and added a Flag column.
=== PROCESSED DATA ===
```json
[
  {\"Region\": 21, \"Region.1\": 22, \"Sales\": 23, \"Sales.1\": 24, \"Total\": 125, \"Flag\": \"high\"}
]
```";

const REPORT_REPLY: &str = "## Overview\n\nSales are concentrated in the north.\n\n- Check the missing costs";

const CHART_REPLY: &str = "Here is the code:
```lua
function plot1(df)
plt.title(\"Units by region\")
    local labels, totals = stats.group_sum(df[\"region\"], df[\"units\"])
    plt.bar(labels, totals)
end

function plot2(df)
    plt.hist(stats.numbers(df[\"price\"]), 4)
end

function plot3(df)
    plt.scatter(df[\"units\"], df[\"revenue\"])
end

function plot4(df)
    error(\"not today\")
end
```";

impl ReasoningService for Scripted {
    fn complete(&self, request: &ChatRequest) -> Result<String, ServiceError> {
        let reply = match request.system.as_str() {
            s if s == TRANSFORM_SYSTEM => TRANSFORM_REPLY,
            s if s == REPORT_SYSTEM => REPORT_REPLY,
            s if s == VISUALIZATION_SYSTEM => CHART_REPLY,
            _ => return Err(ServiceError::InvalidResponse("unexpected task".to_string())),
        };
        Ok(reply.to_string())
    }
}

fn service(root: &Path) -> Service {
    let mut settings = Settings::default().with_data_root(root);
    settings.viz_font_paths = Vec::new();
    settings.viz_width = 400;
    settings.viz_height = 300;
    Service::new(settings, Box::new(MemoryStore::new()), Box::new(Scripted))
}

/// Three merge ranges across a two-row header, then three data rows.
fn write_region_workbook(path: &Path) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let plain = Format::new();
    sheet.merge_range(0, 0, 0, 1, "Region", &plain).unwrap();
    sheet.merge_range(0, 2, 0, 3, "Sales", &plain).unwrap();
    sheet.merge_range(0, 4, 1, 4, "Total", &plain).unwrap();
    sheet.write_string(1, 0, "North").unwrap();
    sheet.write_string(1, 1, "South").unwrap();
    sheet.write_string(1, 2, "Q1").unwrap();
    sheet.write_string(1, 3, "Q2").unwrap();
    for r in 2..5u32 {
        for c in 0..4u16 {
            sheet.write_number(r, c, (r * 10 + c as u32 + 1) as f64).unwrap();
        }
        sheet.write_number(r, 4, (r * 50 + 25) as f64).unwrap();
    }
    workbook.save(path).unwrap();
}

fn columns(preview: &Value) -> Vec<String> {
    preview["columns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_normalize_then_transform() {
    let dir = tempfile::tempdir().unwrap();
    let upload = dir.path().join("regional sales.xlsx");
    write_region_workbook(&upload);
    let svc = service(&dir.path().join("data"));

    let normalized = svc.normalize(&upload);
    assert_eq!(normalized.status, 200, "{}", normalized.body);
    let summary = &normalized.body["summary"];
    // A1:B1, C1:D1 and E1:E2
    assert_eq!(summary["unmergedCells"], 6);
    assert_eq!(summary["totalCols"], 5);
    assert_eq!(summary["totalRows"], 4);
    let names = columns(&normalized.body["preview"]);
    assert_eq!(names, vec!["Region", "Region.1", "Sales", "Sales.1", "Total"]);
    assert!(names.iter().all(|n| !n.contains("Unnamed") && !n.contains("nan")));

    // The caller's upload is untouched; only the stored copy is consumed
    assert!(upload.exists());
    assert_eq!(fs::read_dir(svc.storage().upload_dir()).unwrap().count(), 0);

    let processed = normalized.body["downloadFilename"].as_str().unwrap().to_string();
    assert!(svc.download_processed(&processed).is_ok());

    let transformed = svc.transform(&json!({
        "instruction": "keep rows with Total above 100 and flag them",
        "previewData": normalized.body["preview"],
        "filename": processed,
    }));
    assert_eq!(transformed.status, 200, "{}", transformed.body);
    assert_eq!(
        transformed.body["aiExplanation"],
        "Kept the rows whose Total is above 100 and added a Flag column."
    );
    let diff = &transformed.body["summary"];
    assert_eq!(diff["addedColumns"], json!(["Flag"]));
    assert_eq!(diff["removedColumns"], json!([]));
    assert_eq!(diff["rowCountBefore"], 4);
    assert_eq!(diff["rowCountAfter"], 1);
    assert_eq!(diff["hasChanges"], true);
    assert_eq!(diff["totalRows"], 1);
    assert_eq!(transformed.body["preview"]["data"][0][5], "high");
}

#[test]
fn test_normalize_single_header_merge() {
    let dir = tempfile::tempdir().unwrap();
    let upload = dir.path().join("regions.xlsx");
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.merge_range(0, 0, 0, 2, "Region", &Format::new()).unwrap();
    for c in 0..3u16 {
        sheet.write_number(1, c, (c + 1) as f64).unwrap();
    }
    workbook.save(&upload).unwrap();
    let svc = service(&dir.path().join("data"));

    let resp = svc.normalize(&upload);
    assert_eq!(resp.status, 200, "{}", resp.body);
    assert_eq!(resp.body["summary"]["unmergedCells"], 3);
    assert_eq!(resp.body["summary"]["totalCols"], 3);
    assert_eq!(columns(&resp.body["preview"]), vec!["Region", "Region.1", "Region.2"]);

    // Filled from the anchor, then de-duplicated as column names
    assert_eq!(resp.body["summary"]["totalRows"], 1);
    assert_eq!(resp.body["preview"]["data"][0], json!([1, 2, 3]));
}

#[test]
fn test_analyze_csv_with_charts_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let upload = dir.path().join("orders.csv");
    fs::write(
        &upload,
        "region,units,price,revenue\nNorth,3,9.5,28.5\nSouth,5,4.0,20\nNorth,1,,\nEast,7,2.5,17.5\n",
    )
    .unwrap();
    let svc = service(&dir.path().join("data"));

    let resp = svc.analyze(&upload);
    assert_eq!(resp.status, 200, "{}", resp.body);
    let body = &resp.body;
    assert_eq!(body["basicStats"]["rows"], 4);
    assert_eq!(body["basicStats"]["missingValues"]["price"], 1);
    assert!(body["numericStats"]["units"]["mean"].is_number());
    assert_eq!(body["categoricalStats"]["region"]["topCategories"]["North"], 2);
    assert_eq!(body["analysisReport"], REPORT_REPLY);

    let viz = &body["visualization"];
    assert_eq!(viz["success"], true);
    assert_eq!(viz["images"].as_array().unwrap().len(), 3);
    assert!(viz["code"].as_str().unwrap().contains("    plt.title(\"Units by region\")"));

    let analysis_id = body["analysisId"].as_str().unwrap();
    assert!(svc.analysis_image(analysis_id, "plot_1.png").is_ok());
    assert!(svc.analysis_image(analysis_id, "plot_4.png").is_err());

    let workbook = body["downloadFilename"].as_str().unwrap();
    assert_eq!(workbook, format!("analysis_{}.xlsx", analysis_id));
    let report = svc.download_analysis(workbook).unwrap();
    let html = fs::read_to_string(report).unwrap();
    assert!(html.contains("orders.csv"));
    assert_eq!(html.matches("data:image/png;base64,").count(), 3);
    assert!(html.contains("Sales are concentrated in the north."));
}

#[test]
fn test_analyze_without_chart_routines() {
    struct NoCharts;
    impl ReasoningService for NoCharts {
        fn complete(&self, request: &ChatRequest) -> Result<String, ServiceError> {
            if request.system == VISUALIZATION_SYSTEM {
                Ok("```lua\nlocal nothing = true\n```".to_string())
            } else {
                Ok("report".to_string())
            }
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let upload = dir.path().join("tiny.csv");
    fs::write(&upload, "a,b\n1,2\n3,4\n").unwrap();
    let mut settings = Settings::default().with_data_root(&dir.path().join("data"));
    settings.viz_font_paths = Vec::new();
    let svc = Service::new(settings, Box::new(MemoryStore::new()), Box::new(NoCharts));

    let resp = svc.analyze(&upload);
    assert_eq!(resp.status, 200);
    let viz = &resp.body["visualization"];
    assert_eq!(viz["success"], false);
    assert_eq!(viz["code"], "local nothing = true");
    assert!(viz["error"].as_str().unwrap().contains("no plot routines"));
}
