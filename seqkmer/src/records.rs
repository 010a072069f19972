//! Shared, lazy FASTA/FASTQ record reader: yields `(name, sequence)` pairs
//! one at a time instead of loading a file into a `Vec`, so the minimiser
//! precompute pass (which only needs the sequence) and a query reader
//! (which also needs the name) can share one parser instead of each
//! hand-rolling its own.

use crate::reader::dyn_reader;
use crate::seq::SeqFormat;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

pub struct RecordReader<R> {
    reader: R,
    format: SeqFormat,
    pending_name: Option<String>,
    exhausted: bool,
}

impl RecordReader<BufReader<Box<dyn Read + Send>>> {
    /// Opens `path` and sniffs its first byte to pick FASTA (`>`) or FASTQ
    /// (`@`). Returns `Ok(None)` for an empty file.
    pub fn open(path: &Path) -> io::Result<Option<Self>> {
        let inner = dyn_reader(path)?;
        let mut reader = BufReader::new(inner);
        let format = match reader.fill_buf()?.first() {
            Some(b'>') => SeqFormat::FASTA,
            Some(b'@') => SeqFormat::FASTQ,
            Some(other) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unrecognised record start byte {:?}", *other as char),
                ))
            }
            None => return Ok(None),
        };
        Ok(Some(Self { reader, format, pending_name: None, exhausted: false }))
    }
}

impl<R: BufRead> RecordReader<R> {
    fn next_fasta(&mut self) -> Option<io::Result<(String, Vec<u8>)>> {
        let name = match self.pending_name.take() {
            Some(name) => name,
            None => {
                let mut line = String::new();
                match self.reader.read_line(&mut line) {
                    Ok(0) => {
                        self.exhausted = true;
                        return None;
                    }
                    Err(e) => return Some(Err(e)),
                    Ok(_) => {}
                }
                match line.trim_end().strip_prefix('>') {
                    Some(id) => id.split_whitespace().next().unwrap_or("").to_string(),
                    None => {
                        return Some(Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "expected '>' FASTA record header",
                        )))
                    }
                }
            }
        };

        let mut seq = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.exhausted = true;
                    break;
                }
                Err(e) => return Some(Err(e)),
                Ok(_) => {}
            }
            let trimmed = line.trim_end();
            if let Some(id) = trimmed.strip_prefix('>') {
                self.pending_name = Some(id.split_whitespace().next().unwrap_or("").to_string());
                break;
            }
            seq.extend_from_slice(trimmed.as_bytes());
        }
        Some(Ok((name, seq)))
    }

    fn next_fastq(&mut self) -> Option<io::Result<(String, Vec<u8>)>> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => {
                self.exhausted = true;
                return None;
            }
            Err(e) => return Some(Err(e)),
            Ok(_) => {}
        }
        let name = match line.trim_end().strip_prefix('@') {
            Some(id) => id.split_whitespace().next().unwrap_or("").to_string(),
            None => {
                return Some(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "expected '@' FASTQ record header",
                )))
            }
        };

        line.clear();
        if let Err(e) = self.reader.read_line(&mut line) {
            return Some(Err(e));
        }
        let seq = line.trim_end().as_bytes().to_vec();

        line.clear();
        if let Err(e) = self.reader.read_line(&mut line) {
            return Some(Err(e)); // '+' separator line
        }
        line.clear();
        if let Err(e) = self.reader.read_line(&mut line) {
            return Some(Err(e)); // quality line
        }

        Some(Ok((name, seq)))
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = io::Result<(String, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        match self.format {
            SeqFormat::FASTA => self.next_fasta(),
            SeqFormat::FASTQ => self.next_fastq(),
        }
    }
}
