// src/addressing.rs
//
// Human-friendly addressing syntax used on the command line, lowered to the
// protocol's arbitration pattern/mask pair.
//
//   7df            request 0x7DF, replies from anywhere
//   7df,7e8        unicast: replies only from 0x7E8
//   7df,7xx        multicast: wildcard nibbles become mask holes
//   6f1/12,612/f1  extended addressing bytes after '/'

use crate::error::{Error, Result};
use crate::protocol::Arbitration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressingMode {
    /// Reply accepted from exactly one id.
    Unicast,
    /// Reply pattern with wildcard nibbles.
    Multicast,
}

/// Parsed addressing: a request id plus the reply filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Addressing {
    pub mode: AddressingMode,
    pub request_id: u32,
    pub request_ext: u8,
    pub reply_pattern: u32,
    pub reply_mask: u32,
    pub reply_ext: u8,
}

impl Addressing {
    /// Parse an addressing string (`REQ[/EXT][,REPLY[/EXT]]`).
    ///
    /// Without a reply component, a full-width wildcard is assumed: replies
    /// from any id are accepted.
    pub fn parse(text: &str) -> Result<Addressing> {
        let bad = || Error::invalid_argument(format!("invalid addressing: {text}"));

        let parts: Vec<&str> = text.split(',').collect();
        if parts.is_empty() || parts.len() > 2 {
            return Err(bad());
        }
        let (request_id, request_ext) = parse_component(parts[0]).ok_or_else(bad)?;

        let reply_raw = parts.get(1).map(|p| p.trim()).unwrap_or("");
        let reply_raw = if reply_raw.is_empty() {
            // Wildcard sized to the request id width.
            if request_id > 0x7FF {
                "xxxxxxxx".to_string()
            } else {
                "xxx".to_string()
            }
        } else {
            reply_raw.to_string()
        };

        let (reply_id_str, reply_ext) = match reply_raw.split_once('/') {
            Some((id, ext)) => (id, parse_hex(ext).ok_or_else(bad)? as u8),
            None => (reply_raw.as_str(), 0),
        };

        if reply_id_str.to_ascii_lowercase().contains('x') {
            // Multicast: every wildcard nibble opens a hole in the mask.
            let mut id_text = reply_id_str.trim();
            if let Some(stripped) = id_text
                .strip_prefix("0x")
                .or_else(|| id_text.strip_prefix("0X"))
            {
                id_text = stripped;
            }
            let id_text = if id_text.len() % 2 == 1 {
                format!("0{id_text}")
            } else {
                id_text.to_string()
            };

            let pattern_str: String = id_text
                .chars()
                .map(|c| if c == 'x' || c == 'X' { '0' } else { c })
                .collect();
            let mask_str: String = id_text
                .chars()
                .map(|c| if c == 'x' || c == 'X' { '0' } else { 'F' })
                .collect();
            let pattern = parse_hex(&pattern_str).ok_or_else(bad)?;
            let mut mask = parse_hex(&mask_str).ok_or_else(bad)?;
            if pattern <= 0x7FF {
                mask &= 0x7FF;
            }
            return Ok(Addressing {
                mode: AddressingMode::Multicast,
                request_id,
                request_ext,
                reply_pattern: pattern,
                reply_mask: mask,
                reply_ext,
            });
        }

        let (reply_id, component_ext) = parse_component(&reply_raw).ok_or_else(bad)?;
        let reply_mask = if reply_id > 0x7FF { 0x1FFF_FFFF } else { 0x7FF };
        Ok(Addressing {
            mode: AddressingMode::Unicast,
            request_id,
            request_ext,
            reply_pattern: reply_id,
            reply_mask,
            reply_ext: component_ext,
        })
    }

    /// Lower to the protocol arbitration structure.
    pub fn arbitration(&self) -> Arbitration {
        Arbitration {
            request: self.request_id,
            request_extension: self.request_ext,
            reply_pattern: self.reply_pattern,
            reply_mask: self.reply_mask,
            reply_extension: self.reply_ext,
        }
    }
}

impl std::fmt::Display for Addressing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_id = |value: u32, ext: u8| {
            let base = if value > 0x7FF {
                format!("{value:X}")
            } else {
                format!("{value:03X}")
            };
            if ext != 0 {
                format!("{base}/{ext:02X}")
            } else {
                base
            }
        };
        match self.mode {
            AddressingMode::Multicast => write!(
                f,
                "multicast {} -> {} mask=0x{:X}",
                fmt_id(self.request_id, self.request_ext),
                fmt_id(self.reply_pattern, self.reply_ext),
                self.reply_mask
            ),
            AddressingMode::Unicast => write!(
                f,
                "unicast {} -> {}",
                fmt_id(self.request_id, self.request_ext),
                fmt_id(self.reply_pattern, self.reply_ext)
            ),
        }
    }
}

/// `ID[/EXT]` where both parts are hex.
fn parse_component(component: &str) -> Option<(u32, u8)> {
    let trimmed = component.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut parts = trimmed.split('/');
    let id = parse_hex(parts.next()?)?;
    let ext = match parts.next() {
        Some(ext) => parse_hex(ext)? as u8,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((id, ext))
}

fn parse_hex(text: &str) -> Option<u32> {
    let mut cleaned = text.trim();
    if let Some(stripped) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        cleaned = stripped;
    }
    if cleaned.is_empty() {
        return None;
    }
    u32::from_str_radix(cleaned, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unicast() {
        let addressing = Addressing::parse("7df,7e8").unwrap();
        assert_eq!(addressing.mode, AddressingMode::Unicast);
        assert_eq!(addressing.request_id, 0x7DF);
        assert_eq!(addressing.reply_pattern, 0x7E8);
        assert_eq!(addressing.reply_mask, 0x7FF);

        let arb = addressing.arbitration();
        assert!(arb.accepts(0x7E8));
        assert!(!arb.accepts(0x7E9));
    }

    #[test]
    fn test_unicast_extended_id() {
        let addressing = Addressing::parse("18da33f1,18daf110").unwrap();
        assert_eq!(addressing.reply_pattern, 0x18DAF110);
        assert_eq!(addressing.reply_mask, 0x1FFF_FFFF);
    }

    #[test]
    fn test_extension_bytes() {
        let addressing = Addressing::parse("6f1/12,612/f1").unwrap();
        assert_eq!(addressing.request_id, 0x6F1);
        assert_eq!(addressing.request_ext, 0x12);
        assert_eq!(addressing.reply_pattern, 0x612);
        assert_eq!(addressing.reply_ext, 0xF1);
    }

    #[test]
    fn test_multicast_wildcards() {
        let addressing = Addressing::parse("7df,7xx").unwrap();
        assert_eq!(addressing.mode, AddressingMode::Multicast);
        assert_eq!(addressing.reply_pattern, 0x700);
        assert_eq!(addressing.reply_mask, 0x700);

        let arb = addressing.arbitration();
        assert!(arb.accepts(0x7E8));
        assert!(arb.accepts(0x700));
        assert!(!arb.accepts(0x600));
    }

    #[test]
    fn test_default_reply_is_wildcard() {
        let addressing = Addressing::parse("7df").unwrap();
        assert_eq!(addressing.mode, AddressingMode::Multicast);
        assert_eq!(addressing.reply_mask, 0);
        assert!(addressing.arbitration().accepts(0x123));
        assert!(addressing.arbitration().accepts(0x7E8));

        // Extended request ids widen the wildcard.
        let extended = Addressing::parse("18da33f1").unwrap();
        assert_eq!(extended.reply_mask, 0);
    }

    #[test]
    fn test_narrow_multicast() {
        let addressing = Addressing::parse("7e0,7e0").unwrap();
        assert_eq!(addressing.mode, AddressingMode::Unicast);

        // Pattern 0x7E0 with a 0x7F0 mask via wildcard on the last nibble.
        let wild = Addressing::parse("7e0,7ex").unwrap();
        let arb = wild.arbitration();
        assert!(arb.accepts(0x7E0));
        assert!(arb.accepts(0x7E8));
        assert!(arb.accepts(0x7EF));
        assert!(!arb.accepts(0x7F0));
    }

    #[test]
    fn test_invalid_addressing() {
        assert!(Addressing::parse("").is_err());
        assert!(Addressing::parse("zzz").is_err());
        assert!(Addressing::parse("7df,7e8,7e9").is_err());
        assert!(Addressing::parse("7df/1/2,7e8").is_err());
        assert!(Addressing::parse("7df,7e8/zz").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Addressing::parse("7df,7e8").unwrap().to_string(),
            "unicast 7DF -> 7E8"
        );
        assert_eq!(
            Addressing::parse("7df,7xx").unwrap().to_string(),
            "multicast 7DF -> 700 mask=0x700"
        );
        assert_eq!(
            Addressing::parse("6f1/12,612/f1").unwrap().to_string(),
            "unicast 6F1/12 -> 612/F1"
        );
    }
}
