//! ASCII to binary normalization of legacy VTK files.
//!
//! The reader only ever parses binary POLYDATA. An ASCII file is first
//! rewritten into a temporary binary file with the same sections; the
//! returned [`TempPath`] deletes that file when closed or dropped, which also
//! covers every error path: a conversion that fails leaves nothing behind.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use std::str::FromStr;

use tempfile::TempPath;

use super::{
    read_preamble, scan_sections, DataMode, SectionKind, SectionLine, MAGIC_NUMBER, VERSION,
};
use crate::binary::{write_array, Endianness};
use crate::error::{Error, Result};

/// Description line written into normalized files.
const DESCRIPTION: &str = "converted from ASCII vtk";

/// Whitespace-separated tokens, read across line boundaries.
struct Tokens<R> {
    reader: R,
    line: String,
    pending: Vec<String>,
}

impl<R: BufRead> Tokens<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            pending: Vec::new(),
        }
    }

    fn next_token(&mut self) -> Result<Option<String>> {
        while self.pending.is_empty() {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.pending = self.line.split_whitespace().rev().map(String::from).collect();
        }
        Ok(self.pending.pop())
    }

    fn parse<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self
            .next_token()?
            .ok_or_else(|| Error::MalformedAscii(format!("unexpected end of file reading {what}")))?;
        token
            .parse()
            .map_err(|_| Error::MalformedAscii(format!("invalid {what} '{token}'")))
    }
}

/// Rewrite the ASCII VTK file at `path` as a temporary binary file.
///
/// Fails with [`Error::MalformedAscii`] when the input is not ASCII, lacks a
/// POINTS section, or holds fewer or unparsable values than its section
/// headers declare.
pub fn to_binary(path: &Path) -> Result<TempPath> {
    let mut input = BufReader::new(File::open(path)?);
    let preamble = read_preamble(&mut input)?;
    if preamble.mode != DataMode::Ascii {
        return Err(Error::MalformedAscii(format!(
            "{} is not an ASCII VTK file",
            path.display()
        )));
    }

    let sections = scan_sections(path, DataMode::Ascii)?;
    let points_at = sections
        .get(&SectionKind::Points)
        .copied()
        .ok_or_else(|| Error::MalformedAscii("missing POINTS section".into()))?;

    let mut temp = tempfile::Builder::new()
        .prefix("tractconv-")
        .suffix(".vtk")
        .tempfile()?;
    {
        let mut out = BufWriter::new(temp.as_file_mut());
        write!(
            out,
            "# {MAGIC_NUMBER} DataFile Version {VERSION}\n{DESCRIPTION}\nBINARY\nDATASET POLYDATA\n"
        )?;

        input.seek(SeekFrom::Start(points_at))?;
        let points = SectionLine::read(&mut input)?;
        let mut tokens = Tokens::new(&mut input);
        writeln!(out, "POINTS {} float", points.count)?;
        for _ in 0..points.count * 3 {
            let value: f32 = tokens.parse("point coordinate")?;
            write_array(&mut out, &[value], Endianness::Big)?;
        }
        out.write_all(b"\n")?;

        if let Some(&lines_at) = sections.get(&SectionKind::Lines) {
            input.seek(SeekFrom::Start(lines_at))?;
            let lines = SectionLine::read(&mut input)?;
            let mut tokens = Tokens::new(&mut input);
            writeln!(out, "LINES {} {}", lines.count, lines.size)?;

            let mut words = 0;
            for _ in 0..lines.count {
                let n: i32 = tokens.parse("line point count")?;
                if n < 0 {
                    return Err(Error::MalformedAscii(format!("negative line length {n}")));
                }
                if words + 1 + n as usize > lines.size {
                    return Err(Error::MalformedAscii(format!(
                        "line of {n} points overruns the {} values LINES declares",
                        lines.size
                    )));
                }
                let mut record = Vec::with_capacity(n as usize + 1);
                record.push(n);
                for _ in 0..n {
                    record.push(tokens.parse::<i32>("point index")?);
                }
                words += record.len();
                write_array(&mut out, &record, Endianness::Big)?;
            }
            if words != lines.size {
                return Err(Error::MalformedAscii(format!(
                    "LINES declares {} values, found {words}",
                    lines.size
                )));
            }
        }
        out.flush()?;
    }

    let temp = temp.into_temp_path();
    tracing::debug!(
        source = %path.display(),
        temp = %temp.display(),
        "normalized ASCII VTK to binary"
    );
    Ok(temp)
}
