//! Paged transfer of device-resident buffers
//!
//! Long buffers (keymap, macro storage, compressed definition) move through
//! the transport one page per command. A read of `len` bytes issues
//! `ceil(len / page_size)` batched requests and trims the final page to the
//! exact length. A write slices the data the same way, tagging each page with
//! its exact length.

use tracing::debug;
use vial_transport::protocol::{self, page, vial};
use vial_transport::CommandChannel;

use crate::error::KeyboardError;

/// Per-buffer page command layout
pub trait PageCodec: Send + Sync {
    /// Payload bytes per page
    fn page_size(&self) -> usize;

    /// Build the request for one page
    ///
    /// # Arguments
    /// * `page` - Zero-based page index within this transfer
    /// * `offset` - Absolute byte offset of the page in the device buffer
    /// * `len` - Bytes wanted from this page (1..=page_size)
    fn read_request(&self, page: usize, offset: usize, len: usize) -> Result<Vec<u8>, KeyboardError>;

    /// Extract the page payload from a response
    fn payload<'a>(&self, response: &'a [u8]) -> &'a [u8];

    /// Build the request writing `chunk` at `offset`
    fn write_request(&self, offset: usize, chunk: &[u8]) -> Result<Vec<u8>, KeyboardError> {
        let _ = (offset, chunk);
        Err(KeyboardError::NotSupported("buffer is read-only".into()))
    }
}

/// VIA keymap or macro buffer pages: `[cmd, off_hi, off_lo, size, data...]`
#[derive(Debug, Clone, Copy)]
pub struct BufferPages {
    get_cmd: u8,
    set_cmd: u8,
}

impl BufferPages {
    pub const KEYMAP: Self = Self {
        get_cmd: protocol::via::KEYMAP_GET_BUFFER,
        set_cmd: protocol::via::KEYMAP_SET_BUFFER,
    };

    pub const MACRO: Self = Self {
        get_cmd: protocol::via::MACRO_GET_BUFFER,
        set_cmd: protocol::via::MACRO_SET_BUFFER,
    };

    fn offset(offset: usize) -> Result<u16, KeyboardError> {
        u16::try_from(offset)
            .map_err(|_| KeyboardError::InvalidParameter(format!("buffer offset {offset} out of range")))
    }
}

impl PageCodec for BufferPages {
    fn page_size(&self) -> usize {
        page::BUFFER
    }

    fn read_request(&self, _page: usize, offset: usize, len: usize) -> Result<Vec<u8>, KeyboardError> {
        Ok(protocol::buffer_report(
            self.get_cmd,
            Self::offset(offset)?,
            len as u8,
            &[],
        ))
    }

    fn payload<'a>(&self, response: &'a [u8]) -> &'a [u8] {
        response.get(4..).unwrap_or(&[])
    }

    fn write_request(&self, offset: usize, chunk: &[u8]) -> Result<Vec<u8>, KeyboardError> {
        Ok(protocol::buffer_report(
            self.set_cmd,
            Self::offset(offset)?,
            chunk.len() as u8,
            chunk,
        ))
    }
}

/// Vial compressed definition pages: `[0xFE, 0x02, page_lo, page_hi]`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefinitionPages;

impl PageCodec for DefinitionPages {
    fn page_size(&self) -> usize {
        page::DEFINITION
    }

    fn read_request(&self, page: usize, _offset: usize, _len: usize) -> Result<Vec<u8>, KeyboardError> {
        let page = u16::try_from(page)
            .map_err(|_| KeyboardError::InvalidParameter(format!("definition page {page} out of range")))?;
        Ok(protocol::vial_report(vial::GET_DEFINITION, &page.to_le_bytes()))
    }

    fn payload<'a>(&self, response: &'a [u8]) -> &'a [u8] {
        response
    }
}

/// Number of pages needed for `len` bytes
pub fn page_count(len: usize, page_size: usize) -> usize {
    len.div_ceil(page_size.max(1))
}

/// Build every request for reading `len` bytes starting at `offset`
pub fn read_requests<C: PageCodec + ?Sized>(
    codec: &C,
    offset: usize,
    len: usize,
) -> Result<Vec<Vec<u8>>, KeyboardError> {
    let size = codec.page_size();
    (0..page_count(len, size))
        .map(|page| {
            let start = page * size;
            codec.read_request(page, offset + start, size.min(len - start))
        })
        .collect()
}

/// Concatenate page payloads in order, trimming to `len`
pub fn assemble<C: PageCodec + ?Sized>(
    codec: &C,
    responses: &[Vec<u8>],
    len: usize,
) -> Result<Vec<u8>, KeyboardError> {
    let size = codec.page_size();
    let mut out = Vec::with_capacity(len);
    for (page, response) in responses.iter().enumerate() {
        let want = size.min(len.saturating_sub(page * size));
        let payload = codec.payload(response);
        let part = payload.get(..want).ok_or_else(|| {
            KeyboardError::UnexpectedResponse(format!(
                "page {page} carries {} bytes, expected {want}",
                payload.len()
            ))
        })?;
        out.extend_from_slice(part);
    }
    Ok(out)
}

/// Build every request for writing `data` starting at `offset`
pub fn write_requests<C: PageCodec + ?Sized>(
    codec: &C,
    offset: usize,
    data: &[u8],
) -> Result<Vec<Vec<u8>>, KeyboardError> {
    let size = codec.page_size();
    data.chunks(size)
        .enumerate()
        .map(|(page, chunk)| codec.write_request(offset + page * size, chunk))
        .collect()
}

/// Read `len` bytes from a paged device buffer
pub async fn read_paged<C: PageCodec + ?Sized>(
    channel: &CommandChannel,
    codec: &C,
    offset: usize,
    len: usize,
) -> Result<Vec<u8>, KeyboardError> {
    let requests = read_requests(codec, offset, len)?;
    debug!("Paged read: {} bytes at {} in {} pages", len, offset, requests.len());
    let responses = channel.send_batch(&requests).await?;
    assemble(codec, &responses, len)
}

/// Write `data` to a paged device buffer
pub async fn write_paged<C: PageCodec + ?Sized>(
    channel: &CommandChannel,
    codec: &C,
    offset: usize,
    data: &[u8],
) -> Result<(), KeyboardError> {
    let requests = write_requests(codec, offset, data)?;
    debug!("Paged write: {} bytes at {} in {} pages", data.len(), offset, requests.len());
    channel.send_batch(&requests).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_response(request: &[u8]) -> Vec<u8> {
        // Echo header, fill payload with the low offset byte
        let mut response = request[..4].to_vec();
        response.resize(32, request[2]);
        response
    }

    #[test]
    fn test_layer_scenario_seven_pages() {
        // 8x12 matrix, 96 keycodes, 192 bytes
        let requests = read_requests(&BufferPages::KEYMAP, 0, 192).unwrap();
        assert_eq!(requests.len(), 7);
        for (i, request) in requests.iter().enumerate() {
            let offset = (i * 28) as u16;
            assert_eq!(request[0], 0x12);
            assert_eq!(u16::from_be_bytes([request[1], request[2]]), offset);
            let expected = if i < 6 { 28 } else { 24 };
            assert_eq!(request[3], expected);
        }

        let responses: Vec<Vec<u8>> = requests.iter().map(|r| fake_response(r)).collect();
        let data = assemble(&BufferPages::KEYMAP, &responses, 192).unwrap();
        assert_eq!(data.len(), 192);
        assert_eq!(data.len() / 2, 96);
        assert_eq!(data[28], 28);
    }

    #[test]
    fn test_exact_multiple_has_no_extra_page() {
        let requests = read_requests(&BufferPages::MACRO, 0, 112).unwrap();
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|r| r[3] == 28));
    }

    #[test]
    fn test_zero_length_read() {
        assert!(read_requests(&BufferPages::KEYMAP, 0, 0).unwrap().is_empty());
        assert!(assemble(&BufferPages::KEYMAP, &[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_page_length_law() {
        for len in [1usize, 27, 28, 29, 100, 255] {
            let requests = read_requests(&BufferPages::MACRO, 10, len).unwrap();
            assert_eq!(requests.len(), len.div_ceil(28));
            let responses: Vec<Vec<u8>> = requests.iter().map(|r| fake_response(r)).collect();
            assert_eq!(assemble(&BufferPages::MACRO, &responses, len).unwrap().len(), len);
        }
    }

    #[test]
    fn test_short_page_rejected() {
        let responses = vec![vec![0x12, 0, 0, 28, 1, 2]];
        let err = assemble(&BufferPages::KEYMAP, &responses, 10).unwrap_err();
        assert!(matches!(err, KeyboardError::UnexpectedResponse(_)));
    }

    #[test]
    fn test_write_tags_final_length() {
        let data: Vec<u8> = (0..60).collect();
        let requests = write_requests(&BufferPages::MACRO, 100, &data).unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(&requests[0][..4], &[0x0F, 0, 100, 28]);
        assert_eq!(&requests[2][..4], &[0x0F, 0, 156, 4]);
        assert_eq!(&requests[2][4..], &[56, 57, 58, 59]);
    }

    #[test]
    fn test_offset_out_of_range() {
        let err = read_requests(&BufferPages::KEYMAP, 0x1_0000, 4).unwrap_err();
        assert!(matches!(err, KeyboardError::InvalidParameter(_)));
    }

    #[test]
    fn test_definition_pages() {
        let requests = read_requests(&DefinitionPages, 0, 70).unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2], vec![0xFE, 0x02, 0x02, 0x00]);
        assert!(DefinitionPages.write_request(0, &[1]).is_err());
    }
}
