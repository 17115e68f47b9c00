//! Annotation payloads carried inside image files.
//!
//! Shapes are stored as JSON in a PNG `iTXt` chunk keyed `UserComment`, a
//! free-text field image tooling leaves alone. Reading tolerates the same
//! keyword in `tEXt` and `zTXt` chunks. Only chunks that precede the image
//! data are inspected and carried over on rewrite, each in its original kind.

use std::io::Cursor;

use image::ImageFormat;

use crate::shapes::Shape;

/// Text chunk keyword holding the annotation JSON.
pub const USER_COMMENT_KEYWORD: &str = "UserComment";

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The image carries no annotation payload.
    #[error("image has no {USER_COMMENT_KEYWORD} metadata")]
    Absent,

    #[error("annotation metadata is not a valid shape list: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// Reads and writes shape lists in an image's metadata side channel.
///
/// Implementations work on complete in-memory image files and never touch
/// the filesystem; persisting the returned bytes is the caller's job.
pub trait MetadataCodec: Send + Sync {
    /// Return a copy of `image` whose side channel holds `shapes`.
    fn embed(&self, image: &[u8], shapes: &[Shape]) -> Result<Vec<u8>, MetadataError>;

    /// Read the shape list back out of `image`.
    fn extract(&self, image: &[u8]) -> Result<Vec<Shape>, MetadataError>;
}

/// [`MetadataCodec`] backed by PNG text chunks.
///
/// Embedding into a non-PNG image transcodes it to PNG first.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngCommentCodec;

struct DecodedPng {
    info: png::Info<'static>,
    data: Vec<u8>,
}

impl MetadataCodec for PngCommentCodec {
    fn embed(&self, image: &[u8], shapes: &[Shape]) -> Result<Vec<u8>, MetadataError> {
        let json = serde_json::to_string(shapes).map_err(|e| MetadataError::Encode(e.to_string()))?;

        let transcoded;
        let png_bytes = if is_png(image) {
            image
        } else {
            transcoded = transcode_to_png(image)?;
            transcoded.as_slice()
        };

        let decoded = decode_png(png_bytes)?;
        encode_png(decoded, json)
    }

    fn extract(&self, image: &[u8]) -> Result<Vec<Shape>, MetadataError> {
        if !is_png(image) {
            return Err(MetadataError::Absent);
        }

        let mut decoder = png::Decoder::new(Cursor::new(image));
        decoder.set_ignore_text_chunk(false);
        let reader = decoder
            .read_info()
            .map_err(|e| MetadataError::Decode(e.to_string()))?;

        let text = user_comment(reader.info())?.ok_or(MetadataError::Absent)?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn is_png(image: &[u8]) -> bool {
    matches!(image::guess_format(image), Ok(ImageFormat::Png))
}

fn transcode_to_png(image: &[u8]) -> Result<Vec<u8>, MetadataError> {
    let decoded =
        image::load_from_memory(image).map_err(|e| MetadataError::Decode(e.to_string()))?;
    let mut out = Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| MetadataError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

/// Find the `UserComment` text, preferring `iTXt` over the Latin-1 chunks.
fn user_comment(info: &png::Info<'_>) -> Result<Option<String>, MetadataError> {
    if let Some(chunk) = info
        .utf8_text
        .iter()
        .find(|c| c.keyword == USER_COMMENT_KEYWORD)
    {
        return chunk
            .get_text()
            .map(Some)
            .map_err(|e| MetadataError::Decode(e.to_string()));
    }
    if let Some(chunk) = info
        .uncompressed_latin1_text
        .iter()
        .find(|c| c.keyword == USER_COMMENT_KEYWORD)
    {
        return Ok(Some(chunk.text.clone()));
    }
    if let Some(chunk) = info
        .compressed_latin1_text
        .iter()
        .find(|c| c.keyword == USER_COMMENT_KEYWORD)
    {
        return chunk
            .get_text()
            .map(Some)
            .map_err(|e| MetadataError::Decode(e.to_string()));
    }
    Ok(None)
}

/// Decode a PNG without colour transformations so it can be rewritten as-is.
///
/// The returned info keeps every ancillary chunk the decoder understands
/// (gamma, chromaticities, sRGB intent, ICC profile, physical dimensions and
/// all three text chunk kinds) minus any existing `UserComment`.
fn decode_png(image: &[u8]) -> Result<DecodedPng, MetadataError> {
    let decode_err = |e: png::DecodingError| MetadataError::Decode(e.to_string());

    let mut decoder = png::Decoder::new(Cursor::new(image));
    decoder.set_transformations(png::Transformations::IDENTITY);
    decoder.set_ignore_text_chunk(false);
    let mut reader = decoder.read_info().map_err(decode_err)?;

    let mut info = reader.info().clone();
    info.uncompressed_latin1_text
        .retain(|c| c.keyword != USER_COMMENT_KEYWORD);
    info.compressed_latin1_text
        .retain(|c| c.keyword != USER_COMMENT_KEYWORD);
    info.utf8_text.retain(|c| c.keyword != USER_COMMENT_KEYWORD);
    // Only the first frame is rewritten, de-interlaced.
    info.animation_control = None;
    info.frame_control = None;
    info.interlaced = false;

    let (color_type, bit_depth) = reader.output_color_type();
    info.color_type = color_type;
    info.bit_depth = bit_depth;

    let mut data = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut data).map_err(decode_err)?;
    data.truncate(frame.buffer_size());

    Ok(DecodedPng { info, data })
}

fn encode_png(decoded: DecodedPng, comment: String) -> Result<Vec<u8>, MetadataError> {
    let encode_err = |e: png::EncodingError| MetadataError::Encode(e.to_string());

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::with_info(&mut out, decoded.info).map_err(encode_err)?;
        encoder
            .add_itxt_chunk(USER_COMMENT_KEYWORD.to_string(), comment)
            .map_err(encode_err)?;

        let mut writer = encoder.write_header().map_err(encode_err)?;
        writer.write_image_data(&decoded.data).map_err(encode_err)?;
        writer.finish().map_err(encode_err)?;
    }
    Ok(out)
}
