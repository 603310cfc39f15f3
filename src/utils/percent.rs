use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PercentError {
    #[error("Truncated escape sequence at offset {0}")]
    Truncated(usize),

    #[error("Invalid escape sequence at offset {0}")]
    InvalidEscape(usize),

    #[error("Unescaped value is not valid UTF-8")]
    InvalidUtf8,
}

/// 在URL查询值中可以原样保留的字符
fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"-._~:/@[]!$'()*,;".contains(&b)
}

/// 对查询参数值进行百分号转义
///
/// `&`、`=`、`+`、`%`、`#`、`?`、空格以及非ASCII字节都会被转义。
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for &b in value.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// 反转义查询参数值（`+` 不会被视为空格）
pub fn unescape(value: &str) -> Result<String, PercentError> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return Err(PercentError::Truncated(i));
            }
            let (hi, lo) = (bytes[i + 1], bytes[i + 2]);
            if !hi.is_ascii_hexdigit() || !lo.is_ascii_hexdigit() {
                return Err(PercentError::InvalidEscape(i));
            }
            let hex = [hi, lo];
            let hex = std::str::from_utf8(&hex).map_err(|_| PercentError::InvalidEscape(i))?;
            let b = u8::from_str_radix(hex, 16).map_err(|_| PercentError::InvalidEscape(i))?;
            out.push(b);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| PercentError::InvalidUtf8)
}
