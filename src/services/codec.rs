use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use futures::stream::BoxStream;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Lazily produced compressed bytes. Ends with an `Err` item on failure.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Any uncompressed source that can be read once, front to back.
pub type SourceReader = Box<dyn AsyncRead + Unpin + Send>;

const INFLATE_BUF_SIZE: usize = 64 * 1024; // 64KB

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Corrupt stream: {0}")]
    Corrupt(String),

    #[error("Truncated stream after {0} compressed bytes")]
    Truncated(u64),
}

/// Compression boundary used by both halves of the pipeline.
pub trait Codec: Send + Sync {
    /// Wrap `reader` so that draining the stream yields compressed bytes.
    fn compress_stream(&self, reader: SourceReader, chunk_size: usize) -> ByteStream;

    /// Decompress `src` into `dst`, returning the uncompressed size.
    /// Blocking; on error `dst` does not exist afterwards.
    fn decompress(&self, src: &Path, dst: &Path) -> Result<u64, CodecError>;
}

/// Zlib container codec.
#[derive(Debug, Clone, Copy)]
pub struct ZlibCodec {
    level: Compression,
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Codec for ZlibCodec {
    fn compress_stream(&self, mut reader: SourceReader, chunk_size: usize) -> ByteStream {
        let level = self.level;
        let chunk_size = chunk_size.max(1);

        Box::pin(async_stream::try_stream! {
            let mut encoder = ZlibEncoder::new(Vec::with_capacity(chunk_size), level);
            let mut buffer = vec![0u8; chunk_size];

            loop {
                let n = reader.read(&mut buffer).await?;
                if n == 0 {
                    break;
                }

                encoder.write_all(&buffer[..n])?;

                // Hand over whatever the encoder has flushed so far
                if !encoder.get_ref().is_empty() {
                    let out = std::mem::take(encoder.get_mut());
                    yield Bytes::from(out);
                }
            }

            let tail = encoder.finish()?;
            if !tail.is_empty() {
                yield Bytes::from(tail);
            }
        })
    }

    fn decompress(&self, src: &Path, dst: &Path) -> Result<u64, CodecError> {
        let result = inflate_file(src, dst);
        if result.is_err() {
            let _ = std::fs::remove_file(dst);
        }
        result
    }
}

fn inflate_file(src: &Path, dst: &Path) -> Result<u64, CodecError> {
    let mut input = BufReader::with_capacity(INFLATE_BUF_SIZE, File::open(src)?);
    let mut output = BufWriter::new(File::create(dst)?);
    let mut inflater = Decompress::new(true);
    let mut out_buf = vec![0u8; INFLATE_BUF_SIZE];

    loop {
        let chunk = input.fill_buf()?;
        let eof = chunk.is_empty();
        let flush = if eof {
            FlushDecompress::Finish
        } else {
            FlushDecompress::None
        };

        let in_before = inflater.total_in();
        let out_before = inflater.total_out();
        let status = inflater
            .decompress(chunk, &mut out_buf, flush)
            .map_err(|e| CodecError::Corrupt(e.to_string()))?;
        let consumed = (inflater.total_in() - in_before) as usize;
        let produced = (inflater.total_out() - out_before) as usize;

        input.consume(consumed);
        output.write_all(&out_buf[..produced])?;

        match status {
            Status::StreamEnd => break,
            _ if eof && produced == 0 => return Err(CodecError::Truncated(inflater.total_in())),
            _ => {}
        }
    }

    if !input.fill_buf()?.is_empty() {
        return Err(CodecError::Corrupt(
            "trailing data after end of stream".to_string(),
        ));
    }

    output.flush()?;
    output.get_ref().sync_all()?;
    Ok(inflater.total_out())
}
