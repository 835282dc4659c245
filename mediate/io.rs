use crate::bootstrap::BootstrapSummary;
use crate::types::{CovariateTable, SurvivalDataset, TableError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetIoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: status must be 0 or 1, found {found}")]
    InvalidStatus { row: usize, found: u8 },
    #[error("dataset contains no rows")]
    Empty,
    #[error("dataset is invalid: {0}")]
    Table(#[from] TableError),
}

#[derive(Debug, Serialize, Deserialize)]
struct DatasetRow {
    id: usize,
    exposure: f64,
    confounder1: f64,
    confounder2: f64,
    mediator: f64,
    eventtime: f64,
    status: u8,
}

#[derive(Debug, Serialize)]
struct ReplicateRow<'a> {
    replicate: usize,
    direct_effect: Option<f64>,
    total_effect: Option<f64>,
    mediated_proportion: Option<f64>,
    excluded: &'a str,
}

/// Write a survival dataset as tab-separated text with a header row.
pub fn write_dataset<W: Write>(data: &SurvivalDataset, writer: W) -> Result<(), DatasetIoError> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer);
    let c = &data.covariates;
    for i in 0..data.len() {
        wtr.serialize(DatasetRow {
            id: c.id[i],
            exposure: c.exposure[i],
            confounder1: c.confounder1[i],
            confounder2: c.confounder2[i],
            mediator: c.mediator[i],
            eventtime: data.event_time[i],
            status: u8::from(data.status[i]),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a tab-separated survival dataset. Ids in the file are ignored and
/// reassigned sequentially.
pub fn read_dataset<R: Read>(reader: R) -> Result<SurvivalDataset, DatasetIoError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut exposure = Vec::new();
    let mut confounder1 = Vec::new();
    let mut confounder2 = Vec::new();
    let mut mediator = Vec::new();
    let mut event_time = Vec::new();
    let mut status = Vec::new();

    for (row, record) in rdr.deserialize::<DatasetRow>().enumerate() {
        let record = record?;
        let observed = match record.status {
            0 => false,
            1 => true,
            found => return Err(DatasetIoError::InvalidStatus { row: row + 1, found }),
        };
        exposure.push(record.exposure);
        confounder1.push(record.confounder1);
        confounder2.push(record.confounder2);
        mediator.push(record.mediator);
        event_time.push(record.eventtime);
        status.push(observed);
    }
    if exposure.is_empty() {
        return Err(DatasetIoError::Empty);
    }

    let table = CovariateTable::new(
        Array1::from_vec(exposure),
        Array1::from_vec(confounder1),
        Array1::from_vec(confounder2),
        Array1::from_vec(mediator),
    )?;
    Ok(SurvivalDataset::new(
        table,
        Array1::from_vec(event_time),
        Array1::from_vec(status),
    )?)
}

pub fn write_dataset_file(data: &SurvivalDataset, path: &Path) -> Result<(), DatasetIoError> {
    write_dataset(data, File::create(path)?)
}

pub fn read_dataset_file(path: &Path) -> Result<SurvivalDataset, DatasetIoError> {
    read_dataset(File::open(path)?)
}

/// Write one row per bootstrap replicate, including excluded ones.
pub fn write_replicates<W: Write>(
    summary: &BootstrapSummary,
    writer: W,
) -> Result<(), DatasetIoError> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer);
    for outcome in &summary.replicates {
        let (result, reason) = match &outcome.result {
            Ok(result) => (Some(*result), String::new()),
            Err(failure) => (None, failure.to_string()),
        };
        wtr.serialize(ReplicateRow {
            replicate: outcome.index,
            direct_effect: result.map(|r| r.direct_effect),
            total_effect: result.map(|r| r.total_effect),
            mediated_proportion: result.map(|r| r.mediated_proportion),
            excluded: &reason,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_replicates_file(summary: &BootstrapSummary, path: &Path) -> Result<(), DatasetIoError> {
    write_replicates(summary, File::create(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{BootstrapConfig, run_bootstrap};
    use crate::seeding::RngStreams;
    use crate::test_fixtures::{ScriptedRegression, SurvivalDatasetBuilder};
    use tempfile::tempdir;

    #[test]
    fn dataset_survives_a_tsv_round_trip() {
        let data = SurvivalDatasetBuilder::new(200).seed(9).build();
        let dir = tempdir().unwrap();
        let path = dir.path().join("population.tsv");
        write_dataset_file(&data, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "id\texposure\tconfounder1\tconfounder2\tmediator\teventtime\tstatus\n"
        ));

        let back = read_dataset_file(&path).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn invalid_status_is_reported_with_its_row() {
        let text = "id\texposure\tconfounder1\tconfounder2\tmediator\teventtime\tstatus\n\
                    1\t0.1\t0.2\t0.3\t0.4\t5.0\t1\n\
                    2\t0.1\t0.2\t0.3\t0.4\t5.0\t2\n";
        assert!(matches!(
            read_dataset(text.as_bytes()),
            Err(DatasetIoError::InvalidStatus { row: 2, found: 2 })
        ));

        let header_only = "id\texposure\tconfounder1\tconfounder2\tmediator\teventtime\tstatus\n";
        assert!(matches!(
            read_dataset(header_only.as_bytes()),
            Err(DatasetIoError::Empty)
        ));
    }

    #[test]
    fn replicate_table_lists_every_replicate() {
        let data = SurvivalDatasetBuilder::new(60).build();
        let config = BootstrapConfig {
            replicates: 3,
            ..BootstrapConfig::default()
        };
        let summary = run_bootstrap(
            &data,
            &ScriptedRegression::new(0.4, 0.26),
            &config,
            &RngStreams::new(2),
        )
        .unwrap();

        let mut buf = Vec::new();
        write_replicates(&summary, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "replicate\tdirect_effect\ttotal_effect\tmediated_proportion\texcluded"
        );
        assert!(lines[1].starts_with("1\t0.26\t0.4\t"));
    }
}
