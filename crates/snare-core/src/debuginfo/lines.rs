//! Line table: source lines to code address ranges.

use std::fmt;

use crate::types::symbols::file_name;
use crate::types::{Address, AddressRange};

/// One row of the line table.
///
/// Several entries may share a line (a `for` header emits code in more than
/// one place). Lines that emit no code have no entry at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry
{
    /// Source path as recorded in the debug information.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column, if recorded.
    pub column: Option<u32>,
    /// Code generated for the line.
    pub range: AddressRange,
}

impl LineEntry
{
    /// Final path component of the file.
    #[must_use]
    pub fn file_name(&self) -> &str
    {
        file_name(&self.file)
    }

    /// First address of the entry.
    #[must_use]
    pub fn address(&self) -> Address
    {
        self.range.start
    }
}

impl fmt::Display for LineEntry
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}:{}", self.file_name(), self.line)
    }
}

/// Returns `true` if the recorded path `recorded` names the file the user asked for.
///
/// A bare file name matches any path ending in that name; a query with
/// directories must match whole trailing path components.
#[must_use]
pub fn file_matches(recorded: &str, query: &str) -> bool
{
    if recorded == query {
        return true;
    }
    if !query.contains(['/', '\\']) {
        return file_name(recorded) == query;
    }
    recorded
        .strip_suffix(query)
        .is_some_and(|prefix| prefix.is_empty() || prefix.ends_with(['/', '\\']))
}

/// Address-sorted collection of [`LineEntry`] values.
#[derive(Debug, Clone, Default)]
pub struct LineTable
{
    entries: Vec<LineEntry>,
}

impl LineTable
{
    /// Build a table, sorting the entries by address.
    #[must_use]
    pub fn new(mut entries: Vec<LineEntry>) -> Self
    {
        entries.sort_by(|a, b| {
            a.range
                .start
                .cmp(&b.range.start)
                .then_with(|| a.line.cmp(&b.line))
        });
        Self { entries }
    }

    /// All entries in address order.
    #[must_use]
    pub fn entries(&self) -> &[LineEntry]
    {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Whether any entry belongs to `file`.
    #[must_use]
    pub fn knows_file(&self, file: &str) -> bool
    {
        self.entries.iter().any(|entry| file_matches(&entry.file, file))
    }

    /// Entries of `file` in address order.
    pub fn entries_in_file<'a>(&'a self, file: &'a str) -> impl Iterator<Item = &'a LineEntry> + 'a
    {
        self.entries.iter().filter(move |entry| file_matches(&entry.file, file))
    }

    /// Entries for exactly `line` of `file`; may be empty.
    #[must_use]
    pub fn entries_for_line(&self, file: &str, line: u32) -> Vec<&LineEntry>
    {
        self.entries
            .iter()
            .filter(|entry| entry.line == line && file_matches(&entry.file, file))
            .collect()
    }

    /// Entries whose code starts inside `range`.
    pub fn entries_in_range(&self, range: AddressRange) -> impl Iterator<Item = &LineEntry>
    {
        let start = self.entries.partition_point(|entry| entry.range.start < range.start);
        self.entries[start..]
            .iter()
            .take_while(move |entry| entry.range.start < range.end)
    }

    /// Entry whose range contains `address`.
    #[must_use]
    pub fn entry_for_address(&self, address: Address) -> Option<&LineEntry>
    {
        let upper = self.entries.partition_point(|entry| entry.range.start <= address);
        self.entries[..upper]
            .iter()
            .rev()
            .find(|entry| entry.range.contains(address))
    }

    /// Distinct source files, in first-seen address order.
    #[must_use]
    pub fn files(&self) -> Vec<&str>
    {
        let mut files: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !files.contains(&entry.file.as_str()) {
                files.push(&entry.file);
            }
        }
        files
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn entry(file: &str, line: u32, start: u64, end: u64) -> LineEntry
    {
        LineEntry {
            file: file.to_string(),
            line,
            column: None,
            range: AddressRange::new(Address::new(start), Address::new(end)),
        }
    }

    #[test]
    fn test_file_matching_rules()
    {
        assert!(file_matches("/src/app/main.c", "main.c"));
        assert!(file_matches("/src/app/main.c", "app/main.c"));
        assert!(!file_matches("/src/app/main.c", "pp/main.c"));
        assert!(!file_matches("/src/app/domain.c", "main.c"));
        assert!(file_matches("main.c", "main.c"));
    }

    #[test]
    fn test_lookup_by_line_and_address()
    {
        let table = LineTable::new(vec![
            entry("/t/main.c", 12, 0x1010, 0x1018),
            entry("/t/main.c", 10, 0x1000, 0x1010),
            entry("/t/main.c", 12, 0x1020, 0x1028),
            entry("/t/other.c", 3, 0x1018, 0x1020),
        ]);

        assert_eq!(table.entries()[0].line, 10);
        assert_eq!(table.entries_for_line("main.c", 12).len(), 2);
        assert!(table.entries_for_line("main.c", 11).is_empty());
        assert_eq!(table.entry_for_address(Address::new(0x1019)).unwrap().file, "/t/other.c");
        assert!(table.entry_for_address(Address::new(0x2000)).is_none());
        assert!(table.knows_file("other.c"));
        assert!(!table.knows_file("missing.c"));
        assert_eq!(table.files(), vec!["/t/main.c", "/t/other.c"]);

        let in_range: Vec<u32> = table
            .entries_in_range(AddressRange::new(Address::new(0x1008), Address::new(0x1020)))
            .map(|entry| entry.line)
            .collect();
        assert_eq!(in_range, vec![12, 3]);
    }
}
