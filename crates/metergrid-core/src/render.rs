//! Prometheus text exposition, format version 0.0.4.

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::observe::MetricKind;
use crate::store::Sample;

/// Formats a float in its shortest round-trip form, with the
/// `NaN`/`+Inf`/`-Inf` literals the text format expects.
pub fn fmt_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{value}")
    }
}

/// Sorts samples by (name, labels), the order that groups all samples
/// of one metric contiguously and makes the output deterministic.
pub fn sort_samples(samples: &mut [Sample]) {
    samples.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
}

/// The metric name minus the `_bucket`/`_sum`/`_count` suffix for
/// histogram sub-series; used to group a metric block under one TYPE
/// header.
fn root_name(sample: &Sample) -> &str {
    if sample.kind == MetricKind::Histogram {
        match sample.name.rfind('_') {
            Some(i) => &sample.name[..i],
            None => &sample.name,
        }
    } else {
        &sample.name
    }
}

/// Writes a sorted sample list as a text exposition document.
///
/// Emits a `# TYPE` header whenever the root name changes, a blank
/// line between metric blocks, and one sample line per record.
/// `trim_prefix` is removed from the front of each namespace during
/// emission only; write errors propagate to the caller and end the
/// response.
pub fn write_exposition<W: Write>(
    w: &mut W,
    samples: &[Sample],
    trim_prefix: &str,
) -> io::Result<()> {
    let mut last_root: Option<&str> = None;
    let mut line = String::with_capacity(256);

    for sample in samples {
        let root = root_name(sample);
        let namespace = sample
            .namespace
            .strip_prefix(trim_prefix)
            .unwrap_or(&sample.namespace);

        line.clear();
        if last_root != Some(root) {
            if last_root.is_some() {
                line.push('\n');
            }
            let _ = writeln!(line, "# TYPE {namespace}{root} {}", sample.kind.as_str());
            last_root = Some(root);
        }

        line.push_str(namespace);
        line.push_str(&sample.name);
        if !sample.labels.is_empty() {
            line.push('{');
            for (i, label) in sample.labels.iter().enumerate() {
                if i != 0 {
                    line.push(',');
                }
                line.push_str(&label.name);
                line.push_str("=\"");
                escape_label_value(&mut line, &label.value);
                line.push('"');
            }
            line.push('}');
        }
        line.push(' ');
        line.push_str(&fmt_float(sample.value));
        if sample.time_millis != 0 {
            let _ = write!(line, " {}", sample.time_millis);
        }
        line.push('\n');

        w.write_all(line.as_bytes())?;
    }
    Ok(())
}

fn escape_label_value(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
}
