//! candump 风格的帧文本格式
//!
//! - 标准帧：`123#DEADBEEF`（3 位十六进制 ID）
//! - 扩展帧：`12345678#00`（8 位十六进制 ID）
//! - 远程帧：`123#R`，可带请求长度 `123#R4`
//! - 错误帧：`20000040#...`（扩展格式，ID 带 `ERROR_MASK`）
//!
//! 数据部分允许用 `.` 分隔字节（`123#11.22.33`）。

use crate::{
    ERROR_MASK, EXTENDED_ID_LIMIT, Frame, Header, ID_MASK, MAX_DATA_LEN, ProtocolError,
    STANDARD_ID_LIMIT,
};
use std::fmt;
use std::str::FromStr;

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_error {
            write!(f, "{:08X}#", (self.id & ID_MASK) | ERROR_MASK)?;
        } else if self.is_extended {
            write!(f, "{:08X}#", self.id)?;
        } else {
            write!(f, "{:03X}#", self.id)?;
        }

        if self.is_rtr {
            return write!(f, "R{}", self.len);
        }
        write!(f, "{}", hex::encode_upper(self.data_slice()))
    }
}

impl FromStr for Frame {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id_part, data_part) = s
            .trim()
            .split_once('#')
            .ok_or_else(|| ProtocolError::ParseError(format!("missing '#' in '{}'", s)))?;

        let raw_id = u32::from_str_radix(id_part, 16)
            .map_err(|e| ProtocolError::ParseError(format!("invalid id '{}': {}", id_part, e)))?;

        let header = match id_part.len() {
            1..=3 => Header::standard(raw_id),
            8 if raw_id & ERROR_MASK != 0 => Header {
                id: raw_id & ID_MASK,
                ..Header::error()
            },
            8 => Header::extended(raw_id),
            n => {
                return Err(ProtocolError::ParseError(format!(
                    "id must have 3 (standard) or 8 (extended) hex digits, got {}",
                    n
                )));
            },
        };

        let limit = if header.is_extended || header.is_error {
            EXTENDED_ID_LIMIT
        } else {
            STANDARD_ID_LIMIT
        };
        if header.id >= limit {
            return Err(ProtocolError::InvalidCanId { id: header.id });
        }

        if let Some(len) = data_part.strip_prefix(['R', 'r']) {
            let len = if len.is_empty() {
                0
            } else {
                len.parse::<u8>().map_err(|e| {
                    ProtocolError::ParseError(format!("invalid remote length '{}': {}", len, e))
                })?
            };
            if len as usize > MAX_DATA_LEN {
                return Err(ProtocolError::InvalidLength {
                    expected: MAX_DATA_LEN,
                    actual: len as usize,
                });
            }
            return Ok(Frame::new_remote(header, len));
        }

        let digits: String = data_part.chars().filter(|c| *c != '.').collect();
        let data = hex::decode(&digits)
            .map_err(|e| ProtocolError::ParseError(format!("invalid data '{}': {}", data_part, e)))?;
        Frame::try_with_header(header, &data)
    }
}
