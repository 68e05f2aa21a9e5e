//! # canio Protocol
//!
//! CAN 总线帧定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `error_class`: 错误帧错误类别解析
//! - `text`: candump 风格的文本格式（`123#DEADBEEF`）
//!
//! ## Header Key
//!
//! 每个帧头可以压缩为一个 `u32` key，用于监听器过滤：
//!
//! ```text
//! bit 31      : 扩展帧标志 (EXTENDED_MASK)
//! bit 30      : 远程帧标志 (RTR_MASK)
//! bit 29      : 错误帧标志 (ERROR_MASK，错误帧的 key 固定为该值)
//! bit 0 - 28  : CAN ID (ID_MASK)
//! ```

pub mod error_class;
mod text;

pub use error_class::{ErrorClass, describe_error_classes};

use thiserror::Error;

/// CAN ID 掩码（29 bit）
pub const ID_MASK: u32 = (1 << 29) - 1;
/// 错误帧标志位
pub const ERROR_MASK: u32 = 1 << 29;
/// 远程帧标志位
pub const RTR_MASK: u32 = 1 << 30;
/// 扩展帧标志位
pub const EXTENDED_MASK: u32 = 1 << 31;

/// 标准帧 ID 上限（11 bit）
pub const STANDARD_ID_LIMIT: u32 = 1 << 11;
/// 扩展帧 ID 上限（29 bit）
pub const EXTENDED_ID_LIMIT: u32 = 1 << 29;

/// CAN 2.0 最大数据长度
pub const MAX_DATA_LEN: usize = 8;

/// 帧头（ID + 标志位）
///
/// 监听器按帧头过滤时只比较 [`Header::key`]，因此两个 key 相同的帧头视为同一个过滤条件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    /// CAN ID（标准帧或扩展帧）
    pub id: u32,
    /// 是否为扩展帧（29-bit ID）
    pub is_extended: bool,
    /// 是否为远程帧
    pub is_rtr: bool,
    /// 是否为错误帧（此时 `id` 保存错误类别位）
    pub is_error: bool,
}

impl Header {
    /// 标准帧头
    pub const fn standard(id: u32) -> Self {
        Self {
            id,
            is_extended: false,
            is_rtr: false,
            is_error: false,
        }
    }

    /// 扩展帧头
    pub const fn extended(id: u32) -> Self {
        Self {
            id,
            is_extended: true,
            is_rtr: false,
            is_error: false,
        }
    }

    /// 错误帧头（所有错误帧共享同一个 key）
    pub const fn error() -> Self {
        Self {
            id: 0,
            is_extended: false,
            is_rtr: false,
            is_error: true,
        }
    }

    /// 过滤 key
    pub const fn key(&self) -> u32 {
        if self.is_error {
            return ERROR_MASK;
        }
        let mut key = self.id & ID_MASK;
        if self.is_rtr {
            key |= RTR_MASK;
        }
        if self.is_extended {
            key |= EXTENDED_MASK;
        }
        key
    }

    /// ID 是否在帧类型允许的范围内
    ///
    /// 错误帧的 `id` 是错误类别位，只要求落在 29 bit 内。
    pub const fn is_valid(&self) -> bool {
        if self.is_error || self.is_extended {
            self.id < EXTENDED_ID_LIMIT
        } else {
            self.id < STANDARD_ID_LIMIT
        }
    }
}

/// CAN 2.0 帧
///
/// # 设计特性
///
/// - **Copy trait**：分发时每个监听器拿到自己的副本，与读循环的输入缓冲区解耦
/// - **固定 8 字节**：避免堆分配
/// - **时间戳支持**：`timestamp_us` 为 0 表示不可用
///
/// # 示例
///
/// ```rust
/// use canio_protocol::Frame;
///
/// let frame = Frame::new_standard(0x123, &[1, 2, 3, 4]);
/// assert_eq!(frame.id, 0x123);
/// assert_eq!(frame.data_slice(), &[1, 2, 3, 4]);
/// assert_eq!(frame.to_string(), "123#01020304");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    /// CAN ID（错误帧时为错误类别位）
    pub id: u32,
    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],
    /// 有效数据长度 (0-8)，远程帧时为请求长度
    pub len: u8,
    /// 是否为扩展帧（29-bit ID）
    pub is_extended: bool,
    /// 是否为远程帧
    pub is_rtr: bool,
    /// 是否为错误帧
    pub is_error: bool,
    /// 时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl Frame {
    /// 创建标准数据帧（数据超过 8 字节时截断，需要校验请用 [`Frame::try_with_header`]）
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::with_header(Header::standard(id as u32), data)
    }

    /// 创建扩展数据帧（数据超过 8 字节时截断）
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::with_header(Header::extended(id), data)
    }

    /// 创建远程帧（`len` 为请求的数据长度）
    pub fn new_remote(header: Header, len: u8) -> Self {
        Self {
            id: header.id,
            data: [0; 8],
            len: len.min(MAX_DATA_LEN as u8),
            is_extended: header.is_extended,
            is_rtr: true,
            is_error: false,
            timestamp_us: 0,
        }
    }

    /// 创建错误帧（`error_bits` 为错误类别位，见 [`ErrorClass`]）
    pub fn new_error(error_bits: u32, data: &[u8]) -> Self {
        Self::with_header(
            Header {
                id: error_bits & ID_MASK,
                ..Header::error()
            },
            data,
        )
    }

    /// 按帧头构造
    ///
    /// 数据超过 8 字节时只保留前 8 字节，不报错。
    pub fn with_header(header: Header, data: &[u8]) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(MAX_DATA_LEN);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id: header.id,
            data: fixed_data,
            len: len as u8,
            is_extended: header.is_extended,
            is_rtr: header.is_rtr,
            is_error: header.is_error,
            timestamp_us: 0,
        }
    }

    /// 按帧头构造，数据超过 8 字节时返回 [`ProtocolError::InvalidLength`]
    pub fn try_with_header(header: Header, data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() > MAX_DATA_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: MAX_DATA_LEN,
                actual: data.len(),
            });
        }
        Ok(Self::with_header(header, data))
    }

    /// 帧头
    pub const fn header(&self) -> Header {
        Header {
            id: self.id,
            is_extended: self.is_extended,
            is_rtr: self.is_rtr,
            is_error: self.is_error,
        }
    }

    /// 过滤 key（等价于 `self.header().key()`）
    pub const fn key(&self) -> u32 {
        self.header().key()
    }

    /// 帧是否合法：长度不超过 8 且 ID 在范围内
    pub const fn is_valid(&self) -> bool {
        self.len as usize <= MAX_DATA_LEN && self.header().is_valid()
    }

    /// 获取数据切片（只包含有效数据，远程帧为空）
    pub fn data_slice(&self) -> &[u8] {
        if self.is_rtr {
            return &[];
        }
        &self.data[..(self.len as usize).min(MAX_DATA_LEN)]
    }
}

/// 协议错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected at most {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: u32 },

    #[error("Parse error: {0}")]
    ParseError(String),
}
