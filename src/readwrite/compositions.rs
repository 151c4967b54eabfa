use std::io;

use crate::core::CompositionList;
use crate::errors::{HouseholdError, Result};

/// Reading and writing composition lists as CSV.
///
/// Every record holds the class counts of one composition followed by its weight. The first line
/// is a header.
pub trait CompositionIO: Sized {
    fn read(path: &str) -> Result<Self>;
    fn read_from(reader: impl io::Read, source: &str) -> Result<Self>;
    fn write(&self, path: &str) -> Result<()>;
    fn write_to(&self, writer: impl io::Write) -> Result<()>;
}

impl CompositionIO for CompositionList {
    fn read(path: &str) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|_err| HouseholdError::ReadError(format!("Failed to read from {path}")))?;
        Self::read_from(file, path)
    }

    fn read_from(reader: impl io::Read, source: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut counts: Vec<Vec<i64>> = Vec::new();
        let mut distribution = Vec::new();

        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|_err| {
                HouseholdError::ReadError(format!("Failed to parse record {line} in {source}"))
            })?;
            let (weight, classes) = match record.iter().collect::<Vec<_>>().split_last() {
                Some((weight, classes)) if !classes.is_empty() => (*weight, classes.to_vec()),
                _ => {
                    return Err(HouseholdError::ReadError(format!(
                        "Record {line} in {source} needs class counts and a weight"
                    )));
                }
            };

            distribution.push(parse_field::<f64>(weight, line, source)?);
            counts.push(
                classes
                    .iter()
                    .map(|field| parse_field::<i64>(field, line, source))
                    .collect::<Result<_>>()?,
            );
        }

        CompositionList::from_counts(&counts, distribution)
    }

    fn write(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|_err| HouseholdError::WriteError(format!("Failed to create {path}")))?;
        self.write_to(io::BufWriter::new(file))
    }

    fn write_to(&self, writer: impl io::Write) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        let header = (0..self.n_classes())
            .map(|class| format!("class_{class}"))
            .chain(std::iter::once("weight".to_string()));
        writer
            .write_record(header)
            .map_err(|err| HouseholdError::WriteError(format!("{err}")))?;

        for (composition, weight) in self.iter() {
            let record = composition
                .iter()
                .map(|count| count.to_string())
                .chain(std::iter::once(weight.to_string()));
            writer
                .write_record(record)
                .map_err(|err| HouseholdError::WriteError(format!("{err}")))?;
        }
        writer
            .flush()
            .map_err(|err| HouseholdError::WriteError(format!("{err}")))
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, line: usize, source: &str) -> Result<T> {
    field.trim().parse::<T>().map_err(|_| {
        HouseholdError::ReadError(format!(
            "Failed to parse `{field}` in record {line} of {source}"
        ))
    })
}
