// XLSX sheet layout: which sheet is active and where its merge ranges are.
//
// calamine reads cell values; merge ranges and the active tab live in the
// raw package XML, so they are read here straight from the zip archive.

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use sheetwise_engine::MergeRange;
use zip::ZipArchive;

/// Layout of the sheet a workbook opens on.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    /// Position among the workbook's sheets (0-based)
    pub index: usize,
    pub name: String,
    pub merges: Vec<MergeRange>,
}

/// Read the active sheet's name and merge ranges from an .xlsx file.
pub fn read_active_sheet_layout(path: &Path) -> Result<SheetLayout, String> {
    let file = std::fs::File::open(path)
        .map_err(|e| format!("Failed to open XLSX file: {}", e))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| format!("Failed to read XLSX as ZIP: {}", e))?;

    let workbook_xml = read_zip_file(&mut archive, "xl/workbook.xml")?;
    let rels_xml = read_zip_file(&mut archive, "xl/_rels/workbook.xml.rels").unwrap_or_default();

    let (sheets, active_tab) = parse_workbook_sheets(&workbook_xml);
    if sheets.is_empty() {
        return Err("Workbook contains no sheets".to_string());
    }
    let index = if active_tab < sheets.len() { active_tab } else { 0 };
    let (name, rid) = sheets[index].clone();

    let targets = parse_relationships(&rels_xml);
    let merges = match targets.get(&rid) {
        Some(target) => {
            let sheet_path = worksheet_zip_path(target);
            match read_zip_file(&mut archive, &sheet_path) {
                Ok(xml) => parse_merge_cells(&xml),
                Err(e) => {
                    log::warn!("{}; assuming no merged cells", e);
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };

    Ok(SheetLayout { index, name, merges })
}

/// Sheet (name, rId) pairs in workbook order, plus the `activeTab` index.
pub fn parse_workbook_sheets(workbook_xml: &str) -> (Vec<(String, String)>, usize) {
    let mut sheets = Vec::new();
    let mut active_tab = 0usize;

    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"sheet" => {
                    let mut name = None;
                    let mut rid = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"name" => {
                                name = Some(unescape_xml(&String::from_utf8_lossy(&attr.value)));
                            }
                            b"r:id" => {
                                rid = Some(String::from_utf8_lossy(&attr.value).to_string());
                            }
                            _ => {}
                        }
                    }
                    if let (Some(name), Some(rid)) = (name, rid) {
                        sheets.push((name, rid));
                    }
                }
                b"workbookView" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"activeTab" {
                            active_tab = std::str::from_utf8(&attr.value)
                                .ok()
                                .and_then(|s| s.parse().ok())
                                .unwrap_or(0);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    (sheets, active_tab)
}

/// Relationship id -> target from workbook.xml.rels.
fn parse_relationships(rels_xml: &str) -> HashMap<String, String> {
    let mut rid_to_target = HashMap::new();
    let mut reader = Reader::from_str(rels_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        b"Target" => {
                            target = Some(String::from_utf8_lossy(&attr.value).to_string());
                        }
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    rid_to_target.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    rid_to_target
}

/// Targets are relative to xl/ unless absolute within the package.
fn worksheet_zip_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

/// Collect every `<mergeCell ref="A1:C3"/>` in a worksheet.
pub fn parse_merge_cells(sheet_xml: &str) -> Vec<MergeRange> {
    let mut merges = Vec::new();
    let mut reader = Reader::from_str(sheet_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"mergeCell" =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"ref" {
                        let ref_str = String::from_utf8_lossy(&attr.value);
                        match MergeRange::parse(&ref_str) {
                            Some(range) => merges.push(range),
                            None => log::debug!("skipping malformed merge ref {:?}", ref_str),
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    merges
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Read a file from a ZIP archive.
fn read_zip_file<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String, String> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| format!("File '{}' not found in XLSX: {}", path, e))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    Ok(content)
}
