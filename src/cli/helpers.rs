use crate::blocks::{Block, HelloBlock};
use crate::gns::{RecordType, ResourceRecord};
use colored::*;
use std::str;

/// 格式化表格
pub fn format_table(headers: &[&str], rows: &[Vec<String>], widths: &[usize]) -> String {
    let mut result = String::new();

    let header_row = headers.iter()
        .zip(widths.iter())
        .map(|(h, w)| format!("{:width$}", h, width = *w).bold().to_string())
        .collect::<Vec<_>>()
        .join(" | ");

    result.push_str(&header_row);
    result.push('\n');

    let separator = widths.iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>()
        .join("-+-");

    result.push_str(&separator);
    result.push('\n');

    for row in rows {
        let data_row = row.iter()
            .zip(widths.iter())
            .map(|(cell, w)| format!("{:width$}", cell, width = *w))
            .collect::<Vec<_>>()
            .join(" | ");

        result.push_str(&data_row);
        result.push('\n');
    }

    result
}

/// 格式化HELLO块的内容
pub fn format_hello(hello: &HelloBlock, valid: bool) -> String {
    let status = if valid { "valid".green() } else { "INVALID".red().bold() };

    let mut out = format!(
        "{} {}\n{} {}\n{} {}\n",
        "Peer:".bold(), hello.peer_id().to_string().yellow(),
        "Expires:".bold(), hello.expiration(),
        "Signature:".bold(), status,
    );
    for addr in hello.addresses() {
        out.push_str(&format!("  {}\n", addr.uri().cyan()));
    }
    out
}

/// 记录类型名称
fn record_type_name(record_type: u32) -> String {
    match record_type {
        RecordType::A => "A".to_string(),
        RecordType::CNAME => "CNAME".to_string(),
        RecordType::TXT => "TXT".to_string(),
        RecordType::AAAA => "AAAA".to_string(),
        RecordType::EDKEY => "EDKEY".to_string(),
        other => format!("TYPE{}", other),
    }
}

/// 格式化一条资源记录
pub fn format_record(record: &ResourceRecord) -> String {
    // 文本记录直接显示，其它显示十六进制
    let value = match str::from_utf8(&record.data) {
        Ok(s) if record.record_type == RecordType::TXT || record.record_type == RecordType::CNAME => s.to_string(),
        _ => hex::encode(&record.data),
    };

    format!(
        "{:6} {} (expires {})",
        record_type_name(record.record_type).yellow(),
        value,
        record.expiration.to_string().dimmed()
    )
}

/// 截断过长的字符串用于表格显示
pub fn abbreviate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("short", 10), "short");
        assert_eq!(abbreviate("0123456789ABCDEF", 8), "01234...");
    }

    #[test]
    fn test_record_type_names() {
        assert_eq!(record_type_name(RecordType::TXT), "TXT");
        assert_eq!(record_type_name(99), "TYPE99");
    }

    #[test]
    fn test_format_table() {
        colored::control::set_override(false);
        let table = format_table(&["Key", "Type"], &[vec!["abc".to_string(), "TEST".to_string()]], &[5, 4]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "------+-----");
        assert_eq!(lines[2], "abc   | TEST");
    }
}
