//! Vega / Vega-Lite chart rendering
//!
//! A terminal cannot run the Vega runtime, so "rendering" here means
//! validating the specification, enforcing the minimum canvas size and
//! producing what the front end can show: a summary, an optional bar preview
//! and a standalone vega-embed page that a browser can open.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

pub const MIN_WIDTH: f64 = 600.0;
pub const MIN_HEIGHT: f64 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartKind {
    VegaLite,
    Vega,
}

impl ChartKind {
    /// vega-embed `mode` option
    pub fn mode(&self) -> &'static str {
        match self {
            ChartKind::VegaLite => "vega-lite",
            ChartKind::Vega => "vega",
        }
    }

    /// Fence label that selects this kind
    pub fn fence_label(&self) -> &'static str {
        match self {
            ChartKind::VegaLite => "json/vega_lite",
            ChartKind::Vega => "json/vega",
        }
    }
}

/// A chart specification, either still as text or already parsed
#[derive(Debug, Clone, Copy)]
pub enum SpecSource<'a> {
    Text(&'a str),
    Value(&'a Value),
}

/// Why a chart could not be rendered. The message is shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ChartError {
    message: String,
}

impl ChartError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Outcome of rendering one chart. Failures never escape as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartOutcome {
    Rendered(RenderedChart),
    Failed(ChartError),
}

impl ChartOutcome {
    pub fn chart(&self) -> Option<&RenderedChart> {
        match self {
            ChartOutcome::Rendered(chart) => Some(chart),
            ChartOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ChartError> {
        match self {
            ChartOutcome::Rendered(_) => None,
            ChartOutcome::Failed(err) => Some(err),
        }
    }
}

/// A validated specification with the canvas floors applied
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedChart {
    pub kind: ChartKind,
    pub spec: Value,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartSummary {
    pub title: Option<String>,
    pub mark: Option<String>,
    pub rows: usize,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    pub value: f64,
}

impl RenderedChart {
    pub fn summary(&self) -> ChartSummary {
        let title = match &self.spec["title"] {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("text").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
        .or_else(|| self.spec["description"].as_str().map(str::to_string));

        match self.kind {
            ChartKind::VegaLite => {
                let mark = match &self.spec["mark"] {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("type").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                };
                let rows = self.spec["data"]["values"].as_array().map_or(0, Vec::len);
                let fields = self.spec["encoding"]
                    .as_object()
                    .map(|enc| {
                        enc.iter()
                            .filter_map(|(channel, def)| {
                                def["field"]
                                    .as_str()
                                    .map(|field| format!("{}: {}", channel, field))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                ChartSummary {
                    title,
                    mark,
                    rows,
                    fields,
                }
            }
            ChartKind::Vega => {
                let rows = self.spec["data"]
                    .as_array()
                    .map(|sets| {
                        sets.iter()
                            .filter_map(|set| set["values"].as_array())
                            .map(Vec::len)
                            .sum()
                    })
                    .unwrap_or(0);
                let mut marks: Vec<String> = Vec::new();
                collect_vega_marks(&self.spec["marks"], &mut marks);
                ChartSummary {
                    title,
                    mark: if marks.is_empty() {
                        None
                    } else {
                        Some(marks.join(", "))
                    },
                    rows,
                    fields: Vec::new(),
                }
            }
        }
    }

    /// Bar preview for a single-view Vega-Lite chart with inline data and a
    /// quantitative `y`. Rows with a non-numeric `y` are skipped.
    pub fn bars(&self) -> Option<Vec<Bar>> {
        if self.kind != ChartKind::VegaLite {
            return None;
        }
        let values = self.spec["data"]["values"].as_array()?;
        let x = self.spec["encoding"]["x"]["field"].as_str()?;
        let y = &self.spec["encoding"]["y"];
        if y["type"].as_str() != Some("quantitative") {
            return None;
        }
        let y = y["field"].as_str()?;

        let bars: Vec<Bar> = values
            .iter()
            .filter_map(|row| {
                let value = row[y].as_f64()?;
                let label = match &row[x] {
                    Value::String(s) => s.clone(),
                    Value::Null => return None,
                    other => other.to_string(),
                };
                Some(Bar { label, value })
            })
            .collect();

        if bars.is_empty() {
            None
        } else {
            Some(bars)
        }
    }
}

fn collect_vega_marks(marks: &Value, out: &mut Vec<String>) {
    let Some(marks) = marks.as_array() else {
        return;
    };
    for mark in marks {
        if let Some(kind) = mark["type"].as_str() {
            if kind != "group" && !out.iter().any(|m| m == kind) {
                out.push(kind.to_string());
            }
        }
        collect_vega_marks(&mark["marks"], out);
    }
}

/// Renders chart specifications with fixed embed options
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    pub min_width: f64,
    pub min_height: f64,
    pub theme: String,
    pub renderer: String,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self {
            min_width: MIN_WIDTH,
            min_height: MIN_HEIGHT,
            theme: "carbonwhite".to_string(),
            renderer: "svg".to_string(),
        }
    }
}

impl ChartRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self, kind: ChartKind, source: SpecSource<'_>) -> ChartOutcome {
        match self.try_render(kind, source) {
            Ok(chart) => ChartOutcome::Rendered(chart),
            Err(err) => {
                debug!(kind = kind.mode(), error = %err, "Chart specification rejected");
                ChartOutcome::Failed(err)
            }
        }
    }

    fn try_render(&self, kind: ChartKind, source: SpecSource<'_>) -> Result<RenderedChart, ChartError> {
        let value = match source {
            SpecSource::Text(text) => {
                serde_json::from_str::<Value>(text).map_err(|e| ChartError::new(e.to_string()))?
            }
            SpecSource::Value(value) => value.clone(),
        };
        let Value::Object(mut spec) = value else {
            return Err(ChartError::new("chart specification must be a JSON object"));
        };

        let width = floor_dimension(&spec, "width", self.min_width);
        let height = floor_dimension(&spec, "height", self.min_height);
        spec.insert("width".to_string(), number(width));
        spec.insert("height".to_string(), number(height));

        Ok(RenderedChart {
            kind,
            spec: Value::Object(spec),
            width,
            height,
        })
    }

    /// Embed options passed to vega-embed
    pub fn embed_options(&self, kind: ChartKind) -> Value {
        serde_json::json!({
            "mode": kind.mode(),
            "theme": self.theme,
            "renderer": self.renderer,
        })
    }

    /// Standalone HTML page that draws `chart` with vega-embed.
    pub fn embed_html(&self, chart: &RenderedChart) -> String {
        let title = chart
            .summary()
            .title
            .unwrap_or_else(|| "vegachat chart".to_string());
        format!(
            r##"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <script src="https://cdn.jsdelivr.net/npm/vega@5"></script>
  <script src="https://cdn.jsdelivr.net/npm/vega-lite@5"></script>
  <script src="https://cdn.jsdelivr.net/npm/vega-embed@6"></script>
</head>
<body>
  <div id="vis"></div>
  <script>
    vegaEmbed("#vis", {spec}, {options}).catch(console.error);
  </script>
</body>
</html>
"##,
            title = escape_html(&title),
            spec = script_json(&chart.spec),
            options = script_json(&self.embed_options(chart.kind)),
        )
    }

    /// Write the embed page into `dir` and return its path.
    pub fn export(&self, dir: &Path, chart: &RenderedChart) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let path = dir.join(format!("chart-{}.html", stamp));
        fs::write(&path, self.embed_html(chart))?;
        debug!(path = %path.display(), "Exported chart");
        Ok(path)
    }
}

/// Non-numeric sizes (e.g. `"container"`) count as zero.
fn floor_dimension(spec: &Map<String, Value>, key: &str, min: f64) -> f64 {
    spec.get(key)
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .max(min)
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n >= 0.0 && n <= u64::MAX as f64 {
        Value::from(n as u64)
    } else {
        Value::from(n)
    }
}

fn script_json(value: &Value) -> String {
    value.to_string().replace("</", "<\\/")
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
