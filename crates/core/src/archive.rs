//! Streaming zip assembly.
//!
//! The zip writer runs on a blocking thread and hands every write to the
//! async side as a [`Bytes`] chunk over a bounded channel, so an archive is
//! never held in memory as a whole and a slow client applies backpressure
//! to the writer. A failing entry ends the stream with an `Err` item instead
//! of finishing a truncated archive.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Chunks buffered between the writer thread and the response body.
const CHANNEL_CAPACITY: usize = 16;

/// Byte stream of a zip archive being written.
pub type ArchiveStream = ReceiverStream<io::Result<Bytes>>;

#[derive(Debug, Clone)]
pub enum EntrySource {
    /// Copied from disk while streaming.
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// One named member of an archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub source: EntrySource,
}

/// Start writing `entries` into a zip archive.
///
/// `keep_alive` is held until the writer finishes; pass whatever owns the
/// entry files (e.g. the session) so they outlive the stream.
pub fn stream_archive<G>(entries: Vec<ArchiveEntry>, keep_alive: G) -> ArchiveStream
where
    G: Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::task::spawn_blocking(move || {
        let _keep_alive = keep_alive;
        let count = entries.len();
        let sink = ChannelWriter { tx: tx.clone() };

        match write_archive(sink, entries) {
            Ok(()) => tracing::debug!(entries = count, "Archive streamed"),
            Err(e) => {
                tracing::error!(error = %e, "Archive streaming aborted");
                // The receiver may already be gone if the client disconnected.
                let _ = tx.blocking_send(Err(e));
            }
        }
    });

    ReceiverStream::new(rx)
}

fn write_archive(sink: ChannelWriter, entries: Vec<ArchiveEntry>) -> io::Result<()> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new_stream(sink);

    for entry in entries {
        zip.start_file(entry.name.as_str(), options)
            .map_err(io::Error::other)?;
        match entry.source {
            EntrySource::File(path) => {
                let mut file = File::open(&path).map_err(|e| {
                    io::Error::new(e.kind(), format!("{}: {e}", path.display()))
                })?;
                io::copy(&mut file, &mut zip)?;
            }
            EntrySource::Bytes(data) => zip.write_all(&data)?,
        }
    }

    zip.finish().map_err(io::Error::other)?;
    Ok(())
}

/// `Write` adapter sending each buffer to the channel as it arrives.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive receiver dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
