//! Framed binary file source
//!
//! Buffers on disk are length-prefixed frames:
//!
//! ```text
//! [u32 le frame_len][u16 le tag][payload: frame_len - 2 bytes]
//! ```
//!
//! A partial trailing frame is not an error: the cursor is rewound to the
//! frame start and `Ok(None)` is returned, so a file still being appended
//! to by a live logger can be tailed by re-reading after a backoff.

use crate::error::{Result, SortError};
use crate::source::DataSource;
use crate::types::RawBuffer;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Upper bound on a single frame; anything larger is treated as corruption
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// Reads framed buffers from a file
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    reader: BufReader<File>,
}

impl FileSource {
    /// Open a frame file; fails with [`SortError::Open`] if unreadable
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SortError::open(path.display(), e))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
        })
    }

    /// The path this source reads from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_next(&mut self) -> Result<Option<RawBuffer>> {
        let start = self.reader.stream_position()?;

        let frame_len = match self.reader.read_u32::<LittleEndian>() {
            Ok(len) => len,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.reader.seek(SeekFrom::Start(start))?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if frame_len < 2 || frame_len > MAX_FRAME_BYTES {
            return Err(SortError::Read(format!(
                "invalid frame length {} at offset {} in {}",
                frame_len,
                start,
                self.path.display()
            )));
        }

        let mut frame = vec![0u8; frame_len as usize];
        match self.reader.read_exact(&mut frame) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                // Frame body not fully written yet.
                self.reader.seek(SeekFrom::Start(start))?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let tag = u16::from_le_bytes([frame[0], frame[1]]);
        Ok(Some(RawBuffer {
            tag,
            payload: frame[2..].to_vec(),
        }))
    }
}

/// Append one framed buffer to a writer
///
/// The inverse of [`FileSource::read_next`]; used by archival writers and
/// by tests producing fixture files.
pub fn write_frame<W: Write>(writer: &mut W, buffer: &RawBuffer) -> Result<()> {
    writer.write_u32::<LittleEndian>(buffer.payload.len() as u32 + 2)?;
    writer.write_u16::<LittleEndian>(buffer.tag)?;
    writer.write_all(&buffer.payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn fixture(buffers: &[RawBuffer]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for buffer in buffers {
            write_frame(&mut file, buffer).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_open_missing_file_fails() {
        let err = FileSource::open("/definitely/not/here.dat").unwrap_err();
        assert!(matches!(err, SortError::Open { .. }));
    }

    #[test]
    fn test_round_trip_frames() {
        let buffers = vec![
            RawBuffer::new(1, vec![1, 2, 3]),
            RawBuffer::new(2, Vec::new()),
            RawBuffer::new(1, vec![0xFF; 100]),
        ];
        let file = fixture(&buffers);
        let mut source = FileSource::open(file.path()).unwrap();

        for expected in &buffers {
            let read = source.read_next().unwrap().unwrap();
            assert_eq!(&read, expected);
        }
        assert!(source.read_next().unwrap().is_none());
    }

    #[test]
    fn test_partial_frame_rewinds_and_resumes() {
        let mut file = fixture(&[RawBuffer::new(1, vec![9, 9])]);
        // Append only the length prefix of a second frame.
        file.write_all(&6u32.to_le_bytes()).unwrap();
        file.flush().unwrap();

        let mut source = FileSource::open(file.path()).unwrap();
        assert!(source.read_next().unwrap().is_some());
        assert!(source.read_next().unwrap().is_none());

        // Complete the second frame; the source picks it up where it left off.
        file.write_all(&3u16.to_le_bytes()).unwrap();
        file.write_all(&[7, 7, 7, 7]).unwrap();
        file.flush().unwrap();

        let read = source.read_next().unwrap().unwrap();
        assert_eq!(read.tag, 3);
        assert_eq!(read.payload, vec![7, 7, 7, 7]);
    }

    #[test]
    fn test_corrupt_length_is_read_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&0u32.to_le_bytes()).unwrap();
        file.flush().unwrap();

        let mut source = FileSource::open(file.path()).unwrap();
        assert!(matches!(source.read_next(), Err(SortError::Read(_))));
    }
}
