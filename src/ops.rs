use crate::error::{PullError, Result};
use crate::format::{StreamHeader, TagKind, ABYTES};
use crate::kdf::{derive_key_with, KdfParams};
use crate::secret::{DerivedKey, Secret};
use crate::stream::PullStream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;
use zeroize::Zeroize;

/// Derive the stream key from a password and open the stream
///
/// The derived key is zeroized before this returns; only the engine's
/// ratcheted subkey survives.
pub fn open_with_password(
    password: &Secret,
    salt_encoded: &str,
    params: &KdfParams,
    header: &[u8],
) -> Result<PullStream> {
    let header = StreamHeader::from_bytes(header)?;
    let key = derive_key_with(password, salt_encoded, params)?;
    Ok(PullStream::init(&key, &header))
}

/// Decrypt a stream made of exactly one chunk
///
/// The chunk must carry FINAL; any other tag means the stream continues
/// beyond what was supplied, so it is reported as truncated.
pub fn decrypt_single(chunk: &[u8], key: &[u8], header: &[u8]) -> Result<Vec<u8>> {
    let mut stream = PullStream::new(key, header)?;
    let (mut plaintext, tag) = stream.pull(chunk)?;

    if tag != TagKind::Final {
        plaintext.zeroize();
        warn!(%tag, "single-chunk stream did not end with FINAL");
        return Err(PullError::TruncatedStream);
    }

    Ok(plaintext)
}

/// Decrypt a whole stream supplied as a sequence of chunks
///
/// - `TruncatedStream` if the chunks run out before FINAL
/// - `StreamAlreadyFinalized` if chunks follow FINAL
/// - `AuthenticationFailed` on the first chunk that does not verify
///
/// Plaintext gathered so far is zeroized on every error path.
pub fn decrypt_chunks<I, C>(key: &DerivedKey, header: &StreamHeader, chunks: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let mut stream = PullStream::init(key, header);
    let mut output = Vec::new();

    let result = pull_all(&mut stream, chunks, |plaintext| {
        output.extend_from_slice(plaintext);
    });

    if let Err(e) = result {
        output.zeroize();
        return Err(e);
    }
    Ok(output)
}

/// Authenticate a whole stream without keeping any plaintext
///
/// Returns the number of chunks verified.
pub fn verify_chunks<I, C>(key: &DerivedKey, header: &StreamHeader, chunks: I) -> Result<u64>
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let mut stream = PullStream::init(key, header);
    pull_all(&mut stream, chunks, |_| {})?;
    Ok(stream.chunks_pulled())
}

fn pull_all<I, C, F>(stream: &mut PullStream, chunks: I, mut sink: F) -> Result<()>
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
    F: FnMut(&[u8]),
{
    for chunk in chunks {
        let (mut plaintext, _tag) = stream.pull(chunk.as_ref())?;
        sink(&plaintext);
        plaintext.zeroize();
    }

    if !stream.is_finalized() {
        warn!(
            chunks = stream.chunks_pulled(),
            "input exhausted before the final chunk"
        );
        return Err(PullError::TruncatedStream);
    }
    Ok(())
}

/// Decrypt a stream laid out as fixed-size encrypted frames
///
/// Every frame is `chunk_size + ABYTES` bytes except the last, which may be
/// shorter. Plaintext is written to `writer` chunk by chunk as soon as each
/// chunk verifies; on error, bytes already written came only from verified
/// chunks but the stream as a whole must be treated as invalid.
///
/// Returns the number of plaintext bytes written.
pub async fn decrypt_reader<R, W>(
    mut reader: R,
    mut writer: W,
    key: &DerivedKey,
    header: &StreamHeader,
    chunk_size: usize,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if chunk_size == 0 {
        return Err(PullError::InvalidParameters(
            "chunk_size must be non-zero".to_string(),
        ));
    }
    let frame_size = chunk_size
        .checked_add(ABYTES)
        .filter(|&size| size <= isize::MAX as usize)
        .ok_or_else(|| {
            PullError::InvalidParameters(format!("chunk_size {} is too large", chunk_size))
        })?;

    let mut stream = PullStream::init(key, header);
    let mut buffer = vec![0u8; frame_size];
    let mut written: u64 = 0;

    loop {
        let frame_len = read_frame(&mut reader, &mut buffer).await?;
        if frame_len == 0 {
            break;
        }

        let (mut plaintext, _tag) = stream.pull(&buffer[..frame_len])?;
        writer.write_all(&plaintext).await?;
        written += plaintext.len() as u64;
        plaintext.zeroize();

        if frame_len < buffer.len() && !stream.is_finalized() {
            // a short frame can only be the last one
            break;
        }
    }

    writer.flush().await?;

    if !stream.is_finalized() {
        warn!(
            chunks = stream.chunks_pulled(),
            "reader ended before the final chunk"
        );
        return Err(PullError::TruncatedStream);
    }

    Ok(written)
}

/// Fill `buffer` from `reader`, stopping early only at EOF
async fn read_frame<R>(reader: &mut R, buffer: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
