// ==========================================
// 动态裕度计算服务 - 队列载荷压缩
// ==========================================
// gzip 压缩后 base64 编码；空串原样返回
// ==========================================

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("压缩失败: {0}")]
    Compress(#[source] std::io::Error),

    #[error("base64 解码失败: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("解压失败: {0}")]
    Decompress(#[source] std::io::Error),
}

pub fn compress(raw: &str) -> Result<String, CodecError> {
    if raw.is_empty() {
        return Ok(String::new());
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(raw.as_bytes())
        .map_err(CodecError::Compress)?;
    let bytes = encoder.finish().map_err(CodecError::Compress)?;
    Ok(BASE64.encode(bytes))
}

pub fn decompress(encoded: &str) -> Result<String, CodecError> {
    if encoded.is_empty() {
        return Ok(String::new());
    }
    let bytes = BASE64.decode(encoded)?;
    let mut decoder = GzDecoder::new(bytes.as_slice());
    let mut out = String::new();
    decoder
        .read_to_string(&mut out)
        .map_err(CodecError::Decompress)?;
    Ok(out)
}
