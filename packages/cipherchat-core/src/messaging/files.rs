//! # File Attachments
//!
//! Files travel as `MessageBody::File`: the bytes are encrypted like a text
//! message, while the file name and MIME type go in clear next to the
//! ciphertext so the UI can render a placeholder before decrypting.

use crate::error::{Error, Result};

/// MIME type used when the caller does not know one
pub const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// A file to send, before encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    /// Display name, without any directory part
    pub file_name: String,
    /// MIME type
    pub file_type: String,
    /// File contents
    pub data: Vec<u8>,
}

impl FileAttachment {
    /// Build an attachment, normalising the name and type
    ///
    /// Any directory part of `file_name` is dropped, and an empty type
    /// becomes [`DEFAULT_FILE_TYPE`].
    pub fn new(file_name: &str, file_type: &str, data: Vec<u8>) -> Result<Self> {
        let file_name = file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        if file_name.is_empty() {
            return Err(Error::InvalidMessageContent("file name is empty".into()));
        }

        let file_type = match file_type.trim() {
            "" => DEFAULT_FILE_TYPE.to_string(),
            t => t.to_string(),
        };

        Ok(Self {
            file_name,
            file_type,
            data,
        })
    }

    /// Reject attachments larger than `max_size` bytes
    pub fn check_size(&self, max_size: usize) -> Result<()> {
        if self.data.len() > max_size {
            return Err(Error::InvalidMessageContent(format!(
                "File too large: {} bytes (max {})",
                self.data.len(),
                max_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_directories() {
        let file = FileAttachment::new("C:\\Users\\bob\\photo.png", "image/png", vec![1]).unwrap();
        assert_eq!(file.file_name, "photo.png");

        let file = FileAttachment::new("/tmp/notes.txt", "text/plain", vec![1]).unwrap();
        assert_eq!(file.file_name, "notes.txt");
    }

    #[test]
    fn test_default_type() {
        let file = FileAttachment::new("blob", "", vec![]).unwrap();
        assert_eq!(file.file_type, DEFAULT_FILE_TYPE);
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(FileAttachment::new("dir/", "text/plain", vec![]).is_err());
    }

    #[test]
    fn test_size_limit() {
        let file = FileAttachment::new("a.bin", "", vec![0u8; 10]).unwrap();
        assert!(file.check_size(10).is_ok());
        assert!(matches!(file.check_size(9), Err(Error::InvalidMessageContent(_))));
    }
}
