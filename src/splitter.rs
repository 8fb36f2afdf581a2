//! The size-bounded output splitter.
//!
//! Documents are appended to numbered files rotated every
//! `max_bytes`, laid out as `AA/wiki_00` … `AA/wiki_99`, `AB/wiki_00`
//! and so on. Output compression is optional and appends a `.bz2`
//! suffix.

use bzip2::write::BzEncoder;
use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// How many files go into each directory.
const FILES_PER_DIR: u32 = 100;

/// The `AA/wiki_00` file name sequence.
pub struct NextFile {
    /// The output root.
    path_name: PathBuf,
    /// The current directory index (`AA` is 0).
    dir_index: i64,
    /// The current file index within the directory.
    file_index: i64,
}

impl NextFile {
    /// Creates the sequence rooted at `path_name`. The first call to
    /// [`NextFile::advance`] yields `AA/wiki_00`.
    pub fn new(path_name: impl Into<PathBuf>) -> Self {
        Self {
            path_name: path_name.into(),
            dir_index: -1,
            file_index: -1,
        }
    }

    /// The current directory path.
    fn dirname(&self) -> PathBuf {
        let char1 = u8::try_from(self.dir_index % 26).unwrap_or(0);
        let char2 = u8::try_from(self.dir_index / 26).unwrap_or(0) % 26;
        self.path_name.join(format!(
            "{}{}",
            char::from(b'A' + char2),
            char::from(b'A' + char1)
        ))
    }

    /// Advances to the next file path, creating its directory.
    pub fn advance(&mut self) -> io::Result<PathBuf> {
        self.file_index = (self.file_index + 1) % i64::from(FILES_PER_DIR);
        if self.file_index == 0 {
            self.dir_index += 1;
        }
        let dir = self.dirname();
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
        }
        Ok(dir.join(format!("wiki_{:02}", self.file_index)))
    }
}

/// One open output file, possibly compressed.
enum Output {
    /// A plain text file.
    Plain(File),
    /// A bzip2-compressed file.
    Compressed(BzEncoder<File>),
}

impl Output {
    /// Flushes and closes the file, finishing the compression stream.
    fn finish(self) -> io::Result<()> {
        match self {
            Output::Plain(mut file) => file.flush(),
            Output::Compressed(encoder) => encoder.finish().map(drop),
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Plain(file) => file.write(buf),
            Output::Compressed(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Plain(file) => file.flush(),
            Output::Compressed(encoder) => encoder.flush(),
        }
    }
}

/// The document sink: standard output, or rotating split files.
pub enum Sink {
    /// Everything goes to standard output.
    Stdout(io::Stdout),
    /// Documents go to size-bounded files.
    Split(OutputSplitter),
}

impl Sink {
    /// Creates a sink for the output target `dir`, where `-` selects
    /// standard output.
    pub fn new(dir: &str, max_bytes: u64, compress: bool) -> io::Result<Self> {
        Ok(if dir == "-" {
            Self::Stdout(io::stdout())
        } else {
            fs::create_dir_all(dir)?;
            Self::Split(OutputSplitter::new(dir, max_bytes, compress)?)
        })
    }

    /// Appends one rendered document.
    pub fn write_doc(&mut self, text: &str) -> io::Result<()> {
        match self {
            Self::Stdout(stdout) => stdout.write_all(text.as_bytes()),
            Self::Split(splitter) => splitter.write_doc(text),
        }
    }

    /// Flushes and closes the sink.
    pub fn finish(self) -> io::Result<()> {
        match self {
            Self::Stdout(mut stdout) => stdout.flush(),
            Self::Split(splitter) => splitter.finish(),
        }
    }
}

/// A rotating size-bounded writer over a [`NextFile`] sequence.
pub struct OutputSplitter {
    /// The file name sequence.
    files: NextFile,
    /// The open output file.
    output: Option<Output>,
    /// Uncompressed bytes written to the open file.
    written: u64,
    /// The rotation threshold in uncompressed bytes.
    max_bytes: u64,
    /// Whether outputs are bzip2-compressed.
    compress: bool,
}

impl OutputSplitter {
    /// Creates the splitter and opens its first file.
    pub fn new(dir: impl AsRef<Path>, max_bytes: u64, compress: bool) -> io::Result<Self> {
        let mut splitter = Self {
            files: NextFile::new(dir.as_ref()),
            output: None,
            written: 0,
            max_bytes,
            compress,
        };
        splitter.rotate()?;
        Ok(splitter)
    }

    /// Closes the open file and opens the next one in the sequence.
    fn rotate(&mut self) -> io::Result<()> {
        if let Some(output) = self.output.take() {
            output.finish()?;
        }
        let mut path = self.files.advance()?;
        let output = if self.compress {
            path.set_extension("bz2");
            Output::Compressed(BzEncoder::new(
                File::create(&path)?,
                bzip2::Compression::default(),
            ))
        } else {
            Output::Plain(File::create(&path)?)
        };
        self.output = Some(output);
        self.written = 0;
        Ok(())
    }

    /// Appends one rendered document, rotating first when it would
    /// overflow the current file.
    pub fn write_doc(&mut self, text: &str) -> io::Result<()> {
        let size = text.len() as u64;
        if self.written > 0 && self.written + size > self.max_bytes {
            self.rotate()?;
        }
        let output = self.output.as_mut().expect("splitter file open");
        output.write_all(text.as_bytes())?;
        self.written += size;
        Ok(())
    }

    /// Flushes and closes the last file.
    pub fn finish(mut self) -> io::Result<()> {
        match self.output.take() {
            Some(output) => output.finish(),
            None => Ok(()),
        }
    }
}
