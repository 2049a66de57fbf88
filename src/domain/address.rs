//! 链上定长二进制标识的编解码
//!
//! 地址 20 字节、交易 id 32 字节；入账去重键 opid 为 txid + 2 字节
//! 日志序号，共 34 字节。数据库里一律存原始字节，展示层用十六进制。

use crate::error::{CoreError, Result};

pub const ADDRESS_LENGTH: usize = 20;
pub const TXID_LENGTH: usize = 32;
pub const OPID_LENGTH: usize = 34;

/// 校验定长字段
pub fn ensure_length(what: &'static str, expected: usize, raw: &[u8]) -> Result<()> {
    if raw.len() != expected {
        return Err(CoreError::InvalidByteLength {
            what,
            expected,
            actual: raw.len(),
        });
    }
    Ok(())
}

/// 0x 前缀十六进制地址
pub fn format_address(raw: &[u8]) -> String {
    format!("0x{}", hex::encode(raw))
}

pub fn parse_address(s: &str) -> Result<Vec<u8>> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let raw = hex::decode(stripped).map_err(|_| CoreError::InvalidByteLength {
        what: "address",
        expected: ADDRESS_LENGTH,
        actual: stripped.len() / 2,
    })?;
    ensure_length("address", ADDRESS_LENGTH, &raw)?;
    Ok(raw)
}

pub fn format_txid(raw: &[u8]) -> String {
    format!("0x{}", hex::encode(raw))
}

pub fn parse_txid(s: &str) -> Result<Vec<u8>> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let raw = hex::decode(stripped).map_err(|_| CoreError::InvalidByteLength {
        what: "txid",
        expected: TXID_LENGTH,
        actual: stripped.len() / 2,
    })?;
    ensure_length("txid", TXID_LENGTH, &raw)?;
    Ok(raw)
}

/// 一笔链上交易可以携带多条转账日志，txid + 日志序号才是入账的唯一键
pub fn make_opid(txid: &[u8], log_index: u16) -> Result<Vec<u8>> {
    ensure_length("txid", TXID_LENGTH, txid)?;
    let mut opid = Vec::with_capacity(OPID_LENGTH);
    opid.extend_from_slice(txid);
    opid.extend_from_slice(&log_index.to_be_bytes());
    Ok(opid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trip() {
        let raw = vec![0xab; ADDRESS_LENGTH];
        let formatted = format_address(&raw);
        assert!(formatted.starts_with("0x"));
        assert_eq!(parse_address(&formatted).unwrap(), raw);
    }

    #[test]
    fn address_length_is_enforced() {
        assert!(parse_address("0xabcd").is_err());
        assert!(ensure_length("address", ADDRESS_LENGTH, &[0u8; 19]).is_err());
    }

    #[test]
    fn opid_is_txid_plus_log_index() {
        let txid = vec![0x11; TXID_LENGTH];
        let opid = make_opid(&txid, 7).unwrap();
        assert_eq!(opid.len(), OPID_LENGTH);
        assert_eq!(&opid[..TXID_LENGTH], txid.as_slice());
        assert_eq!(&opid[TXID_LENGTH..], &[0, 7]);
    }

    #[test]
    fn opid_rejects_short_txid() {
        assert!(make_opid(&[0u8; 31], 0).is_err());
    }
}
