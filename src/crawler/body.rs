use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Response body buffer: in memory up to a limit, then in a temp file
///
/// The temp file lives under `<job>/temp` and is removed when the buffer is
/// dropped.
#[derive(Debug)]
pub struct SpooledBody {
    memory: Vec<u8>,
    file: Option<NamedTempFile>,
    len: u64,
    limit: usize,
    temp_dir: PathBuf,
}

impl SpooledBody {
    pub fn new(limit: usize, temp_dir: &Path) -> Self {
        Self {
            memory: Vec::new(),
            file: None,
            len: 0,
            limit,
            temp_dir: temp_dir.to_path_buf(),
        }
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.file.is_none() && self.memory.len() + chunk.len() > self.limit {
            std::fs::create_dir_all(&self.temp_dir)?;
            let mut file = tempfile::Builder::new()
                .prefix("body-")
                .tempfile_in(&self.temp_dir)?;
            file.write_all(&self.memory)?;
            self.memory = Vec::new();
            self.file = Some(file);
        }

        match &mut self.file {
            Some(file) => file.write_all(chunk)?,
            None => self.memory.extend_from_slice(chunk),
        }
        self.len += chunk.len() as u64;
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_spilled(&self) -> bool {
        self.file.is_some()
    }

    /// Reader over the whole body, from the start
    pub fn reader(&mut self) -> io::Result<Box<dyn Read + '_>> {
        match &mut self.file {
            Some(file) => {
                file.flush()?;
                Ok(Box::new(file.reopen()?))
            }
            None => Ok(Box::new(Cursor::new(self.memory.as_slice()))),
        }
    }

    /// Reads the whole body into memory
    pub fn to_bytes(&mut self) -> io::Result<Vec<u8>> {
        if self.file.is_none() {
            return Ok(self.memory.clone());
        }
        let mut bytes = Vec::with_capacity(self.len as usize);
        self.reader()?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_small_body_stays_in_memory() {
        let dir = TempDir::new().unwrap();
        let mut body = SpooledBody::new(16, &dir.path().join("temp"));
        body.write_chunk(b"hello").unwrap();
        body.write_chunk(b" world").unwrap();

        assert!(!body.is_spilled());
        assert_eq!(body.len(), 11);
        assert_eq!(body.to_bytes().unwrap(), b"hello world");
        assert!(!dir.path().join("temp").exists());
    }

    #[test]
    fn test_spill_to_disk_and_cleanup() {
        let dir = TempDir::new().unwrap();
        let temp = dir.path().join("temp");
        let mut body = SpooledBody::new(4, &temp);
        body.write_chunk(b"abc").unwrap();
        body.write_chunk(b"defgh").unwrap();

        assert!(body.is_spilled());
        assert_eq!(std::fs::read_dir(&temp).unwrap().count(), 1);

        let mut read = String::new();
        body.reader().unwrap().read_to_string(&mut read).unwrap();
        assert_eq!(read, "abcdefgh");
        assert_eq!(body.to_bytes().unwrap(), b"abcdefgh");

        drop(body);
        assert_eq!(std::fs::read_dir(&temp).unwrap().count(), 0);
    }
}
