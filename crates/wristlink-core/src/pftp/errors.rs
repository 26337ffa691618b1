//! 设备错误码翻译
//!
//! 尽力而为：表中没有的错误码原样透传（`TransportError::DeviceCode`）。

use crate::error::{Error, RemoteError, TransportError};

pub const PFTP_DOMAIN: &str = "PFTP";

/// 查表，返回可读描述
pub fn describe(code: u16) -> Option<&'static str> {
    let message = match code {
        // 设备端暂态
        100 => "Device is rebooting",
        101 => "Try again later",
        102 => "Device is synchronizing",
        103 => "Storage is being formatted",
        // 主机端错误
        200 => "Unidentified host error",
        201 => "Invalid command",
        202 => "Invalid parameter",
        203 => "No such file or directory",
        204 => "Directory already exists",
        205 => "File already exists",
        206 => "Operation not permitted",
        207 => "No such user",
        208 => "Request timed out",
        // 设备端错误
        300 => "Unidentified device error",
        301 => "Not implemented",
        302 => "System busy",
        303 => "Invalid content",
        304 => "Checksum failure",
        305 => "Disk full",
        306 => "Prerequisite not met",
        307 => "Insufficient buffer",
        308 => "Wait for idling",
        309 => "Battery too low",
        310 => "Directory not empty",
        _ => return None,
    };
    Some(message)
}

/// 将链路错误转换为库错误，顺带翻译已知的设备错误码
pub fn translate(error: TransportError) -> Error {
    match error {
        TransportError::DeviceCode(code) => match describe(code) {
            Some(message) => Error::Remote(RemoteError {
                domain: PFTP_DOMAIN,
                code,
                message,
            }),
            None => Error::Transport(TransportError::DeviceCode(code)),
        },
        other => Error::Transport(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code() {
        match translate(TransportError::DeviceCode(203)) {
            Error::Remote(remote) => {
                assert_eq!(remote.domain, "PFTP");
                assert_eq!(remote.code, 203);
                assert_eq!(remote.message, "No such file or directory");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_code_passes_through() {
        assert!(matches!(
            translate(TransportError::DeviceCode(4242)),
            Error::Transport(TransportError::DeviceCode(4242))
        ));
    }

    #[test]
    fn test_link_error_untouched() {
        assert!(matches!(
            translate(TransportError::Closed),
            Error::Transport(TransportError::Closed)
        ));
    }
}
