//! Image input for the stream-write operation

use async_compression::tokio::bufread::{GzipDecoder, XzDecoder, ZstdDecoder};
use dsu_errors::{Error, InstallError};
use dsu_types::CompressionCodec;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

/// Decompressed image bytes
pub type ImageReader = Box<dyn AsyncRead + Unpin + Send>;

fn read_error(path: &Path, err: &std::io::Error) -> Error {
    InstallError::ImageRead {
        path: path.display().to_string(),
        message: err.to_string(),
    }
    .into()
}

/// Open `path` and layer the decoder for `codec` on top
///
/// # Errors
///
/// Returns `InstallError::ImageRead` if the file cannot be opened.
pub async fn open_image(path: &Path, codec: CompressionCodec) -> Result<ImageReader, Error> {
    let file = File::open(path).await.map_err(|e| read_error(path, &e))?;
    let buffered = BufReader::new(file);

    Ok(match codec {
        CompressionCodec::None => Box::new(buffered),
        CompressionCodec::Xz => Box::new(XzDecoder::new(buffered)),
        CompressionCodec::Gzip => {
            let mut decoder = GzipDecoder::new(buffered);
            decoder.multiple_members(true);
            Box::new(decoder)
        }
        CompressionCodec::Zstd => Box::new(ZstdDecoder::new(buffered)),
    })
}

/// Fill `buf` as far as the stream allows; a short count means end of stream
///
/// # Errors
///
/// Returns `InstallError::ImageRead` on read or decode failure.
pub async fn read_chunk(
    reader: &mut ImageReader,
    buf: &mut [u8],
    path: &Path,
) -> Result<usize, Error> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(|e| read_error(path, &e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
