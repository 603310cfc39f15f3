use ::base32::Alphabet;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Base32Error {
    #[error("Invalid base32 character '{0}'")]
    InvalidCharacter(char),

    #[error("Non-zero padding bits")]
    NonZeroPadding,

    #[error("Dangling base32 characters")]
    TrailingCharacters,

    #[error("Invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

/// 将二进制数据编码为base32字符串
///
/// 使用Crockford字母表，与GNUnet一致，不加填充。
pub fn encode(data: &[u8]) -> String {
    ::base32::encode(Alphabet::Crockford, data)
}

/// 解码base32字符串
///
/// 大小写不敏感，`O`/`I`/`L`/`U` 按GNUnet的规则映射。
/// 只接受规范编码：补位必须为零，且不能有多余的字符。
pub fn decode(s: &str) -> Result<Vec<u8>, Base32Error> {
    let normalized = s.chars()
        .map(normalize)
        .collect::<Result<String, _>>()?;

    let data = ::base32::decode(Alphabet::Crockford, &normalized)
        .ok_or(Base32Error::TrailingCharacters)?;

    let canonical = encode(&data);
    if canonical != normalized {
        return Err(if canonical.len() == normalized.len() {
            Base32Error::NonZeroPadding
        } else {
            Base32Error::TrailingCharacters
        });
    }

    Ok(data)
}

/// 解码base32字符串并检查解码后的长度
pub fn decode_exact(s: &str, len: usize) -> Result<Vec<u8>, Base32Error> {
    let data = decode(s)?;
    if data.len() != len {
        return Err(Base32Error::InvalidLength { expected: len, got: data.len() });
    }
    Ok(data)
}

/// 把一个字符映射到字母表中的规范形式
fn normalize(c: char) -> Result<char, Base32Error> {
    let mapped = match c.to_ascii_uppercase() {
        'O' => '0',
        'I' | 'L' => '1',
        'U' => 'V',
        other => other,
    };
    match mapped {
        '0'..='9' | 'A'..='H' | 'J' | 'K' | 'M' | 'N' | 'P'..='T' | 'V'..='Z' => Ok(mapped),
        _ => Err(Base32Error::InvalidCharacter(c)),
    }
}
