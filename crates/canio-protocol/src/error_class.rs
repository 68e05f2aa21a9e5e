//! 错误帧错误类别
//!
//! 错误帧的 ID 字段是一组错误类别位（与 Linux `<linux/can/error.h>` 一致），
//! 驱动将其作为 `internal_error` 记录在状态中。

/// 错误类别位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorClass {
    TxTimeout = 0x0000_0001,
    LostArbitration = 0x0000_0002,
    Controller = 0x0000_0004,
    Protocol = 0x0000_0008,
    Transceiver = 0x0000_0010,
    NoAck = 0x0000_0020,
    BusOff = 0x0000_0040,
    BusError = 0x0000_0080,
    Restarted = 0x0000_0100,
    ErrorCounter = 0x0000_0200,
}

impl ErrorClass {
    /// 所有已知类别（按位从低到高）
    pub const ALL: [ErrorClass; 10] = [
        ErrorClass::TxTimeout,
        ErrorClass::LostArbitration,
        ErrorClass::Controller,
        ErrorClass::Protocol,
        ErrorClass::Transceiver,
        ErrorClass::NoAck,
        ErrorClass::BusOff,
        ErrorClass::BusError,
        ErrorClass::Restarted,
        ErrorClass::ErrorCounter,
    ];

    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub const fn is_set(self, bits: u32) -> bool {
        bits & (self as u32) != 0
    }

    pub const fn description(self) -> &'static str {
        match self {
            ErrorClass::TxTimeout => "TX timeout",
            ErrorClass::LostArbitration => "lost arbitration",
            ErrorClass::Controller => "controller problems",
            ErrorClass::Protocol => "protocol violation",
            ErrorClass::Transceiver => "transceiver status",
            ErrorClass::NoAck => "received no ACK on transmission",
            ErrorClass::BusOff => "bus off",
            ErrorClass::BusError => "bus error",
            ErrorClass::Restarted => "controller restarted",
            ErrorClass::ErrorCounter => "TX/RX error counter",
        }
    }

    /// 提取 `bits` 中所有已知类别
    pub fn from_bits(bits: u32) -> impl Iterator<Item = ErrorClass> {
        Self::ALL.into_iter().filter(move |class| class.is_set(bits))
    }
}

/// 将错误类别位转换为可读描述
///
/// ```rust
/// use canio_protocol::describe_error_classes;
///
/// assert_eq!(describe_error_classes(0), "OK");
/// assert_eq!(describe_error_classes(0x40), "bus off");
/// assert_eq!(describe_error_classes(0x22), "lost arbitration, received no ACK on transmission");
/// ```
pub fn describe_error_classes(bits: u32) -> String {
    if bits == 0 {
        return "OK".to_string();
    }

    let known: u32 = ErrorClass::ALL.iter().map(|c| c.bits()).sum();
    let mut parts: Vec<String> = ErrorClass::from_bits(bits)
        .map(|class| class.description().to_string())
        .collect();

    let unknown = bits & !known;
    if unknown != 0 {
        parts.push(format!("unknown (0x{:X})", unknown));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bits() {
        let classes: Vec<_> = ErrorClass::from_bits(0x41).collect();
        assert_eq!(classes, vec![ErrorClass::TxTimeout, ErrorClass::BusOff]);
    }

    #[test]
    fn test_describe_unknown_bits() {
        assert_eq!(describe_error_classes(0x1000), "unknown (0x1000)");
        assert_eq!(describe_error_classes(0x1040), "bus off, unknown (0x1000)");
    }
}
