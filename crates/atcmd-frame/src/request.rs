use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::scanner::{FrameMode, MAX_DECLARED_SIZE, PREFIX, TERMINATOR};

/// Encode a request frame, as a host would send it.
///
/// Wire format:
/// ```text
/// explicit:  AT+ SSSS serial ; name[,args] ;
/// implicit:  AT+ 0000 serial ; name[,args] <CR>
/// ```
/// In explicit mode `SSSS` counts `name[,args];` including the closing `;`.
pub fn encode_request(
    serial: u32,
    name: &str,
    args: Option<&str>,
    mode: FrameMode,
    dst: &mut BytesMut,
) -> Result<()> {
    let args_len = args.map_or(0, |args| args.len() + 1);
    let body_len = name.len() + args_len + 1;

    let size = match mode {
        FrameMode::Explicit => {
            if body_len > MAX_DECLARED_SIZE {
                return Err(FrameError::PayloadTooLarge {
                    size: body_len,
                    max: MAX_DECLARED_SIZE,
                });
            }
            body_len
        }
        FrameMode::Implicit => 0,
    };

    dst.reserve(PREFIX.len() + 4 + 11 + body_len);
    dst.put_slice(PREFIX);
    dst.put_slice(format!("{size:04}{serial}").as_bytes());
    dst.put_u8(TERMINATOR);
    dst.put_slice(name.as_bytes());
    if let Some(args) = args {
        dst.put_u8(b',');
        dst.put_slice(args.as_bytes());
    }
    match mode {
        FrameMode::Explicit => dst.put_u8(TERMINATOR),
        FrameMode::Implicit => dst.put_u8(b'\r'),
    }
    Ok(())
}
