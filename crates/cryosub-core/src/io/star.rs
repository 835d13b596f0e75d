use std::fmt::Write as _;
use std::path::Path;

use crate::error::{Result, SubtractError};

/// One `data_` block of a STAR file. Values are kept verbatim as text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StarBlock {
    pub name: String,
    /// Column labels without the leading underscore, e.g. `rlnImageName`.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// `loop_` table (true) or key/value pairs (false, exactly one row).
    pub is_loop: bool,
}

impl StarBlock {
    pub fn new_loop(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
            is_loop: true,
        }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in `row`, if both exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Replace a column's values, appending the column if it is new.
    pub fn set_column(&mut self, column: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(SubtractError::Star(format!(
                "Column {} has {} values for {} rows",
                column,
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(column) {
            Some(col) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[col] = value;
                }
            }
            None => {
                self.columns.push(column.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }
}

/// A parsed STAR file: blocks in file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StarFile {
    pub blocks: Vec<StarBlock>,
}

#[derive(PartialEq)]
enum State {
    Outside,
    Pairs,
    LoopHeader,
    LoopRows,
}

impl StarFile {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text).map_err(|e| match e {
            SubtractError::Star(msg) => {
                SubtractError::Star(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut blocks: Vec<StarBlock> = Vec::new();
        let mut state = State::Outside;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix("data_") {
                blocks.push(StarBlock {
                    name: name.trim().to_string(),
                    ..Default::default()
                });
                state = State::Pairs;
                continue;
            }

            let block = blocks.last_mut().ok_or_else(|| {
                SubtractError::Star(format!("line {}: content before first data_ block", lineno + 1))
            })?;

            if line == "loop_" {
                if !block.columns.is_empty() {
                    return Err(SubtractError::Star(format!(
                        "line {}: more than one table in block '{}'",
                        lineno + 1,
                        block.name
                    )));
                }
                block.is_loop = true;
                state = State::LoopHeader;
                continue;
            }

            let mut tokens = line.split_whitespace();
            match state {
                State::LoopHeader if line.starts_with('_') => {
                    let label = tokens.next().unwrap_or_default();
                    block.columns.push(label[1..].to_string());
                }
                State::LoopHeader | State::LoopRows => {
                    let row: Vec<String> = tokens.map(str::to_string).collect();
                    if row.len() != block.columns.len() {
                        return Err(SubtractError::Star(format!(
                            "line {}: row has {} fields, block '{}' has {} columns",
                            lineno + 1,
                            row.len(),
                            block.name,
                            block.columns.len()
                        )));
                    }
                    block.rows.push(row);
                    state = State::LoopRows;
                }
                State::Pairs if line.starts_with('_') => {
                    let label = tokens.next().unwrap_or_default();
                    let value = tokens.next().ok_or_else(|| {
                        SubtractError::Star(format!("line {}: {} has no value", lineno + 1, label))
                    })?;
                    block.columns.push(label[1..].to_string());
                    match block.rows.first_mut() {
                        Some(row) => row.push(value.to_string()),
                        None => block.rows.push(vec![value.to_string()]),
                    }
                }
                State::Pairs | State::Outside => {
                    return Err(SubtractError::Star(format!(
                        "line {}: unexpected content '{}'",
                        lineno + 1,
                        line
                    )));
                }
            }
        }

        Ok(Self { blocks })
    }

    pub fn block(&self, name: &str) -> Option<&StarBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Index of the particle table: the block named `particles`, otherwise
    /// the first block with an `rlnImageName` column.
    pub fn particle_block_index(&self) -> Option<usize> {
        self.blocks
            .iter()
            .position(|b| b.name == "particles")
            .or_else(|| self.blocks.iter().position(|b| b.has_column("rlnImageName")))
    }

    pub fn to_star_string(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            let _ = writeln!(out, "\ndata_{}\n", block.name);
            if block.is_loop {
                out.push_str("loop_\n");
                for (i, column) in block.columns.iter().enumerate() {
                    let _ = writeln!(out, "_{} #{}", column, i + 1);
                }
                for row in &block.rows {
                    out.push_str(&row.join(" "));
                    out.push('\n');
                }
            } else if let Some(row) = block.rows.first() {
                for (column, value) in block.columns.iter().zip(row) {
                    let _ = writeln!(out, "_{} {}", column, value);
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_star_string())?;
        Ok(())
    }
}
