//! 端口编号
//!
//! Build HAT 有 4 个物理接口（A-D），协议中以序号 0-3 表示。

use crate::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// 物理端口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Port {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
}

impl Port {
    /// 所有端口（按序号排列）
    pub const ALL: [Port; 4] = [Port::A, Port::B, Port::C, Port::D];

    /// 端口序号（0-3），也是协议中使用的编号
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// 端口字母（'A'-'D'）
    pub fn letter(self) -> char {
        (b'A' + self as u8) as char
    }

    /// 从 ASCII 数字字符解析（用于 `P0:` 之类的行前缀）
    pub(crate) fn from_ascii_digit(c: u8) -> Option<Port> {
        match c {
            b'0' => Some(Port::A),
            b'1' => Some(Port::B),
            b'2' => Some(Port::C),
            b'3' => Some(Port::D),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Port {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Port::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| ProtocolError::InvalidPort(value.to_string()))
    }
}

impl FromStr for Port {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" | "0" => Ok(Port::A),
            "B" | "b" | "1" => Ok(Port::B),
            "C" | "c" | "2" => Ok(Port::C),
            "D" | "d" | "3" => Ok(Port::D),
            other => Err(ProtocolError::InvalidPort(other.to_string())),
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_index_and_letter() {
        assert_eq!(Port::A.index(), 0);
        assert_eq!(Port::D.index(), 3);
        assert_eq!(Port::C.letter(), 'C');
        assert_eq!(Port::B.to_string(), "B");
    }

    #[test]
    fn test_port_try_from() {
        assert_eq!(Port::try_from(2).unwrap(), Port::C);
        assert!(matches!(
            Port::try_from(4),
            Err(ProtocolError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_port_from_str() {
        assert_eq!("a".parse::<Port>().unwrap(), Port::A);
        assert_eq!("3".parse::<Port>().unwrap(), Port::D);
        assert!("E".parse::<Port>().is_err());
    }
}
