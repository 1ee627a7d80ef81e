use tracing::debug;

use crate::label::{derive_label, ImageRef, Label};
use crate::scan::{agent_blocks, ScanError};

/// Result of rewriting one script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rewrite {
    pub script: String,
    /// One label per replaced block, in source order.
    pub labels: Vec<Label>,
    /// Container agent blocks left untouched for lack of an image.
    pub skipped: usize,
}

impl Rewrite {
    pub fn changed(&self) -> bool {
        !self.labels.is_empty()
    }
}

/// Label-based replacement for a container agent block.
pub fn label_agent(label: &Label) -> String {
    format!("agent {{ label '{label}' }}")
}

/// Image reference of the first container agent block, if it declares one.
pub fn extract_image_reference(script: &str) -> Result<Option<ImageRef>, ScanError> {
    let first = agent_blocks(script).next().transpose()?;
    Ok(first.and_then(|block| block.image))
}

/// Replaces every `agent { docker { ... } }` block that names an image with
/// `agent { label '<label>' }`. Bytes outside replaced blocks are copied as is.
pub fn rewrite_all(script: &str) -> Result<Rewrite, ScanError> {
    let mut out = String::with_capacity(script.len());
    let mut labels = Vec::new();
    let mut skipped = 0;
    let mut copied = 0;

    for block in agent_blocks(script) {
        let block = block?;
        let Some(image) = &block.image else {
            debug!(offset = block.span.start, "container agent without image; leaving as is");
            skipped += 1;
            continue;
        };
        let label = derive_label(image);
        debug!(image = %image, label = %label, offset = block.span.start, "replacing container agent");
        out.push_str(&script[copied..block.span.start]);
        out.push_str(&label_agent(&label));
        copied = block.span.end;
        labels.push(label);
    }
    out.push_str(&script[copied..]);

    Ok(Rewrite { script: out, labels, skipped })
}
