//! Translation between the persisted document and structured values
//!
//! Both directions are pure. Malformed persisted text is treated as "no
//! prior settings" (the key is skipped with a warning) so a corrupted
//! document never blocks startup; the companion's own defaults win.

use std::collections::BTreeMap;

use tracing::warn;

use crate::document::{keys, SettingsDocument};
use crate::values::{CornerTable, Series};

/// Structured settings as consumed and produced by the RPC surface
pub type StructuredSettings = BTreeMap<String, StructuredValue>;

/// A structured setting value
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredValue {
    Series(Series),
    Table(CornerTable),
}

/// Document keys holding series JSON text
const SERIES_KEYS: [&str; 2] = [keys::VIDEO_CONFIG, keys::SURFACE_ALPHAS];

/// Build the structured view of a document.
///
/// Series keys translate independently; an empty string is the
/// all-absent series. The corner tables are translated only when both
/// texts are present, non-empty, and parse: corners apply as a pair or
/// not at all.
pub fn to_structured(doc: &SettingsDocument) -> StructuredSettings {
    let mut structured = StructuredSettings::new();

    for key in SERIES_KEYS {
        let Some(text) = doc.text(key) else { continue };
        if text.is_empty() {
            structured.insert(key.to_string(), StructuredValue::Series(Series::new()));
            continue;
        }
        match Series::from_json(text) {
            Ok(series) => {
                structured.insert(key.to_string(), StructuredValue::Series(series));
            }
            Err(err) => warn!(key, %err, "ignoring malformed series text"),
        }
    }

    let canvas = doc.text(keys::CANVAS_CORNERS).filter(|t| !t.is_empty());
    let frame = doc.text(keys::FRAME_CORNERS).filter(|t| !t.is_empty());
    if let (Some(canvas), Some(frame)) = (canvas, frame) {
        match (CornerTable::from_csv(canvas), CornerTable::from_csv(frame)) {
            (Ok(canvas), Ok(frame)) => {
                structured.insert(
                    keys::CANVAS_CORNERS.to_string(),
                    StructuredValue::Table(canvas),
                );
                structured.insert(
                    keys::FRAME_CORNERS.to_string(),
                    StructuredValue::Table(frame),
                );
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!(%err, "ignoring corner tables, malformed CSV");
            }
        }
    }

    structured
}

/// Build the persisted view of structured settings.
///
/// Series re-serialize to JSON text, except that an empty series
/// becomes the empty string (never the text of an empty structure).
/// Tables re-serialize to CSV text under the same key.
pub fn to_document(structured: &StructuredSettings) -> SettingsDocument {
    let mut doc = SettingsDocument::new();
    for (key, value) in structured {
        match value {
            StructuredValue::Series(series) => {
                let text = if series.is_empty() {
                    String::new()
                } else {
                    series.to_json()
                };
                doc.set(key.clone(), text);
            }
            StructuredValue::Table(table) => {
                doc.set(key.clone(), table.to_csv());
            }
        }
    }
    doc
}

/// Overwrite `doc` entries with `incoming` ones.
///
/// Returns whether anything actually changed, so callers can skip the
/// persistence write when the merge was a no-op.
pub fn merge(doc: &mut SettingsDocument, incoming: &SettingsDocument) -> bool {
    let mut changed = false;
    for (key, value) in incoming.iter() {
        if doc.get(key) != Some(value) {
            doc.set(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}
