//! Detection-label export and archive entry layout.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::archive::{ArchiveEntry, EntrySource};
use crate::error::CoreError;
use crate::session::AnnotatedImage;
use crate::shapes::Shape;

/// Export formats accepted by the export endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One `label x y width height` line per shape.
    Yolo,
}

impl FromStr for ExportFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yolo" => Ok(Self::Yolo),
            other => Err(CoreError::UnsupportedFormat(format!(
                "'{other}' (supported: yolo)"
            ))),
        }
    }
}

/// Render shapes as detection label text, one line per shape.
///
/// Polygons and circles are written as their enclosing axis-aligned box.
/// Absent and empty shape lists both give an empty string. The label is the
/// first whitespace-free token of each line.
pub fn to_detection_labels(shapes: Option<&[Shape]>) -> String {
    let mut out = String::new();
    for shape in shapes.unwrap_or_default() {
        let Some(bbox) = shape.bounding_box() else {
            continue;
        };
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = write!(
            out,
            "{} {} {} {} {}",
            label_token(shape.label()),
            bbox.x,
            bbox.y,
            bbox.width,
            bbox.height
        );
    }
    out
}

/// A label as a single field: whitespace runs become `_`, an empty label
/// becomes `_`.
fn label_token(label: &str) -> String {
    let token = label.split_whitespace().collect::<Vec<_>>().join("_");
    if token.is_empty() {
        "_".to_string()
    } else {
        token
    }
}

/// Label text for one image in the requested format.
pub fn render_labels(image: &AnnotatedImage, format: ExportFormat) -> String {
    match format {
        ExportFormat::Yolo => to_detection_labels(image.metadata.as_deref()),
    }
}

fn image_entry_name(image: &AnnotatedImage) -> String {
    format!("image-{}.{}", image.id, image.extension())
}

fn label_entry_name(image: &AnnotatedImage) -> String {
    format!("image-{}.txt", image.id)
}

fn file_entry(name: String, image: &AnnotatedImage) -> ArchiveEntry {
    ArchiveEntry {
        name,
        source: EntrySource::File(image.path.clone()),
    }
}

/// Entries for a page download: `image-{position}-{id}.{ext}`.
pub fn page_entries(page: &[(usize, AnnotatedImage)]) -> Vec<ArchiveEntry> {
    page.iter()
        .map(|(position, image)| {
            file_entry(
                format!("image-{position}-{}.{}", image.id, image.extension()),
                image,
            )
        })
        .collect()
}

/// Entries for downloading every image: `image-{id}.{ext}`.
pub fn image_entries(images: &[AnnotatedImage]) -> Vec<ArchiveEntry> {
    images
        .iter()
        .map(|image| file_entry(image_entry_name(image), image))
        .collect()
}

/// The image and its label file, side by side.
pub fn export_image(image: &AnnotatedImage, format: ExportFormat) -> Vec<ArchiveEntry> {
    vec![
        file_entry(image_entry_name(image), image),
        ArchiveEntry {
            name: label_entry_name(image),
            source: EntrySource::Bytes(render_labels(image, format).into_bytes()),
        },
    ]
}

/// All images under `images/` and their labels under `labels/`, in
/// session order.
pub fn export_all(images: &[AnnotatedImage], format: ExportFormat) -> Vec<ArchiveEntry> {
    let mut entries = Vec::with_capacity(images.len() * 2);
    entries.extend(
        images
            .iter()
            .map(|image| file_entry(format!("images/{}", image_entry_name(image)), image)),
    );
    entries.extend(images.iter().map(|image| ArchiveEntry {
        name: format!("labels/{}", label_entry_name(image)),
        source: EntrySource::Bytes(render_labels(image, format).into_bytes()),
    }));
    entries
}
