//! Vendor Driver Return Codes
//!
//! RP1210 drivers report status as a signed 16-bit integer. Zero is
//! success, values from 128 upward are standard error codes, and anything
//! else is vendor specific.

/// Return codes from the vendor driver
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    NoErrors = 0,
    DllNotInitialized = 128,
    InvalidClientId = 129,
    ClientAlreadyConnected = 130,
    ClientAreaFull = 131,
    FreeMemory = 132,
    NotEnoughMemory = 133,
    InvalidDevice = 134,
    DeviceInUse = 135,
    InvalidProtocol = 136,
    TxQueueFull = 137,
    TxQueueCorrupt = 138,
    RxQueueFull = 139,
    RxQueueCorrupt = 140,
    MessageTooLong = 141,
    HardwareNotResponding = 142,
    CommandNotSupported = 143,
    InvalidCommand = 144,
    TxMessageStatus = 145,
    AddressClaimFailed = 146,
    CannotSetPriority = 147,
    ClientDisconnected = 148,
    ConnectNotAllowed = 149,
    ChangeModeFailed = 150,
    BusOff = 151,
    CouldNotTxAddressClaimed = 152,
    AddressLost = 153,
    CodeNotFound = 154,
    BlockNotAllowed = 155,
    MultipleClientsConnected = 156,
    AddressNeverClaimed = 157,
    WindowHandleRequired = 158,
    MessageNotSent = 159,
    MaxNotifyExceeded = 160,
    MaxFilterExceeded = 161,
    HardwareStatusChange = 162,
    Unknown = -1,
}

impl From<i16> for ReturnCode {
    fn from(code: i16) -> Self {
        match code {
            0 => Self::NoErrors,
            128 => Self::DllNotInitialized,
            129 => Self::InvalidClientId,
            130 => Self::ClientAlreadyConnected,
            131 => Self::ClientAreaFull,
            132 => Self::FreeMemory,
            133 => Self::NotEnoughMemory,
            134 => Self::InvalidDevice,
            135 => Self::DeviceInUse,
            136 => Self::InvalidProtocol,
            137 => Self::TxQueueFull,
            138 => Self::TxQueueCorrupt,
            139 => Self::RxQueueFull,
            140 => Self::RxQueueCorrupt,
            141 => Self::MessageTooLong,
            142 => Self::HardwareNotResponding,
            143 => Self::CommandNotSupported,
            144 => Self::InvalidCommand,
            145 => Self::TxMessageStatus,
            146 => Self::AddressClaimFailed,
            147 => Self::CannotSetPriority,
            148 => Self::ClientDisconnected,
            149 => Self::ConnectNotAllowed,
            150 => Self::ChangeModeFailed,
            151 => Self::BusOff,
            152 => Self::CouldNotTxAddressClaimed,
            153 => Self::AddressLost,
            154 => Self::CodeNotFound,
            155 => Self::BlockNotAllowed,
            156 => Self::MultipleClientsConnected,
            157 => Self::AddressNeverClaimed,
            158 => Self::WindowHandleRequired,
            159 => Self::MessageNotSent,
            160 => Self::MaxNotifyExceeded,
            161 => Self::MaxFilterExceeded,
            162 => Self::HardwareStatusChange,
            _ => Self::Unknown,
        }
    }
}

impl ReturnCode {
    /// Whether the driver reported success
    pub fn is_ok(&self) -> bool {
        *self == ReturnCode::NoErrors
    }

    /// Human readable description of the code
    pub fn description(&self) -> &'static str {
        match self {
            Self::NoErrors => "no errors",
            Self::DllNotInitialized => "driver not initialized",
            Self::InvalidClientId => "invalid client id",
            Self::ClientAlreadyConnected => "client already connected",
            Self::ClientAreaFull => "client area full",
            Self::FreeMemory => "could not free memory",
            Self::NotEnoughMemory => "not enough memory",
            Self::InvalidDevice => "invalid device",
            Self::DeviceInUse => "device in use",
            Self::InvalidProtocol => "invalid protocol",
            Self::TxQueueFull => "transmit queue full",
            Self::TxQueueCorrupt => "transmit queue corrupt",
            Self::RxQueueFull => "receive queue full",
            Self::RxQueueCorrupt => "receive queue corrupt",
            Self::MessageTooLong => "message too long",
            Self::HardwareNotResponding => "hardware not responding",
            Self::CommandNotSupported => "command not supported",
            Self::InvalidCommand => "invalid command",
            Self::TxMessageStatus => "transmit message status",
            Self::AddressClaimFailed => "address claim failed",
            Self::CannotSetPriority => "cannot set priority",
            Self::ClientDisconnected => "client disconnected",
            Self::ConnectNotAllowed => "connect not allowed",
            Self::ChangeModeFailed => "change mode failed",
            Self::BusOff => "bus off",
            Self::CouldNotTxAddressClaimed => "could not transmit address claimed",
            Self::AddressLost => "address lost",
            Self::CodeNotFound => "code not found",
            Self::BlockNotAllowed => "blocking not allowed",
            Self::MultipleClientsConnected => "multiple clients connected",
            Self::AddressNeverClaimed => "address never claimed",
            Self::WindowHandleRequired => "window handle required",
            Self::MessageNotSent => "message not sent",
            Self::MaxNotifyExceeded => "maximum notify exceeded",
            Self::MaxFilterExceeded => "maximum filter exceeded",
            Self::HardwareStatusChange => "hardware status change",
            Self::Unknown => "unknown vendor code",
        }
    }
}
