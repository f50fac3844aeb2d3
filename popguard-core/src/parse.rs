//! パース関連のユーティリティ関数

use crate::{BreakpointPosition, Result, SessionError};

/// `Class:LINE` 形式のソース位置をパースする
///
/// クラス名にコロンが含まれる場合に備え、最後のコロンで分割します。
///
/// # Examples
/// ```
/// use popguard_core::parse::parse_position;
///
/// let pos = parse_position("PopFramesTarget:86").unwrap();
/// assert_eq!(pos.class, "PopFramesTarget");
/// assert_eq!(pos.line, 86);
/// ```
pub fn parse_position(s: &str) -> Result<BreakpointPosition> {
    let s = s.trim();

    let (class, line) = s.rsplit_once(':').ok_or_else(|| {
        SessionError::InvalidConfig(format!("Invalid position '{}': expected CLASS:LINE", s))
    })?;

    let class = class.trim();
    if class.is_empty() {
        return Err(SessionError::InvalidConfig(format!(
            "Invalid position '{}': empty class name",
            s
        )));
    }

    let line = line
        .trim()
        .parse::<u32>()
        .map_err(|e| SessionError::InvalidConfig(format!("Invalid line in '{}': {}", s, e)))?;
    if line == 0 {
        return Err(SessionError::InvalidConfig(format!(
            "Invalid line in '{}': must be positive",
            s
        )));
    }

    Ok(BreakpointPosition::new(class, line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position() {
        let pos = parse_position("PopFramesTarget:86").unwrap();
        assert_eq!(pos, BreakpointPosition::new("PopFramesTarget", 86));

        let pos = parse_position("  a.b.C : 12 ").unwrap();
        assert_eq!(pos, BreakpointPosition::new("a.b.C", 12));
    }

    #[test]
    fn test_parse_position_last_colon() {
        let pos = parse_position("ns::Type:7").unwrap();
        assert_eq!(pos.class, "ns::Type");
        assert_eq!(pos.line, 7);
    }

    #[test]
    fn test_parse_position_invalid() {
        assert!(parse_position("PopFramesTarget").is_err());
        assert!(parse_position(":86").is_err());
        assert!(parse_position("Target:abc").is_err());
        assert!(parse_position("Target:0").is_err());
        assert!(parse_position("Target:-3").is_err());
    }
}
