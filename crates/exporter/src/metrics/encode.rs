//! Exposition encodings.

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};

/// Prometheus text 0.0.4 content type.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// OpenMetrics 1.0 content type.
pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Selectable output format of [`super::Metrics::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Text,
    OpenMetrics,
}

impl Encoding {
    /// Pick an encoding from an HTTP `Accept` header.
    pub fn from_accept(accept: Option<&str>) -> Self {
        match accept {
            Some(a) if a.contains("application/openmetrics-text") => Encoding::OpenMetrics,
            _ => Encoding::Text,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Encoding::Text => TEXT_CONTENT_TYPE,
            Encoding::OpenMetrics => OPENMETRICS_CONTENT_TYPE,
        }
    }
}

pub(crate) fn encode_families(
    families: &[MetricFamily],
    encoding: Encoding,
) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(families, &mut buffer)?;
    let text = String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("non UTF-8 exposition: {e}")))?;

    match encoding {
        Encoding::Text => Ok(text),
        Encoding::OpenMetrics => Ok(to_openmetrics(&text)),
    }
}

/// OpenMetrics requires `_total` on counter samples; our counters keep their
/// historical names, so they are declared `unknown`. The body ends with `# EOF`.
fn to_openmetrics(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for line in text.lines() {
        match line.strip_prefix("# TYPE ") {
            Some(rest) if rest.ends_with(" counter") => {
                let name = rest.trim_end_matches(" counter");
                out.push_str("# TYPE ");
                out.push_str(name);
                out.push_str(" unknown");
            }
            _ => out.push_str(line),
        }
        out.push('\n');
    }
    out.push_str("# EOF\n");
    out
}
