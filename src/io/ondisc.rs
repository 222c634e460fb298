//! A lazily-loaded experiment backed by an indexed mzML file.
//!
//! Opening parses only the run metadata and the offset index. Spectra are
//! materialized one at a time by seeking to their recorded byte offset and
//! parsing that single element. The file handle stays open for the lifetime
//! of the value and is released when it is dropped.
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::experiment::ExperimentalSettings;
use crate::spectrum::Spectrum;

use super::mzml::{build_index_by_scan, read_index_from_end, MzMLParserError, MzMLReader};
use super::offset_index::OffsetIndex;

pub struct OnDiscMSExperiment {
    path: PathBuf,
    handle: BufReader<File>,
    spectrum_index: OffsetIndex,
    chromatogram_index: OffsetIndex,
    settings: ExperimentalSettings,
}

impl std::fmt::Debug for OnDiscMSExperiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnDiscMSExperiment")
            .field("path", &self.path)
            .field("spectra", &self.spectrum_index.len())
            .field("chromatograms", &self.chromatogram_index.len())
            .finish()
    }
}

impl OnDiscMSExperiment {
    /// Open `path`, reading the trailing index if present and scanning for
    /// start tags otherwise, then parse the run metadata.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MzMLParserError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let (spectrum_index, chromatogram_index) = match read_index_from_end(&mut file)? {
            Some(indices) => indices,
            None => build_index_by_scan(&mut file)?,
        };

        // Parse run metadata by walking the header up to the first indexed
        // entity.
        file.seek(SeekFrom::Start(0))?;
        let mut header_reader = MzMLReader::from_reader(BufReader::new(file));
        let _ = header_reader.read_next()?;
        let settings = header_reader.settings.clone();

        let file = File::open(&path)?;
        Ok(Self {
            path,
            handle: BufReader::new(file),
            spectrum_index,
            chromatogram_index,
            settings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &ExperimentalSettings {
        &self.settings
    }

    /// The number of spectra the index declares.
    pub fn len(&self) -> usize {
        self.spectrum_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectrum_index.is_empty()
    }

    pub fn chromatogram_count(&self) -> usize {
        self.chromatogram_index.len()
    }

    pub fn spectrum_ids(&self) -> impl Iterator<Item = &str> {
        self.spectrum_index.keys().map(|k| k.as_ref())
    }

    /// Load the spectrum at `index` in file order.
    pub fn get_spectrum(&mut self, index: usize) -> Result<Option<Spectrum>, MzMLParserError> {
        let Some((_, offset)) = self.spectrum_index.get_index(index) else {
            return Ok(None);
        };
        self.read_at(offset)
    }

    /// Load the spectrum with the given native id.
    pub fn get_spectrum_by_id(&mut self, id: &str) -> Result<Option<Spectrum>, MzMLParserError> {
        let Some(offset) = self.spectrum_index.get(id) else {
            return Ok(None);
        };
        self.read_at(offset)
    }

    fn read_at(&mut self, offset: u64) -> Result<Option<Spectrum>, MzMLParserError> {
        self.handle.seek(SeekFrom::Start(offset))?;
        let mut reader = MzMLReader::from_reader(&mut self.handle);
        reader.read_next()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::experiment::MSExperiment;
    use crate::io::mzml::MzMLWriter;
    use crate::peaks::CentroidPeak;
    use crate::spectrum::{ScanEvent, SpectrumDescription};

    fn write_experiment(path: &Path, n: usize) {
        let mut experiment = MSExperiment::new();
        for i in 0..n {
            let mut description = SpectrumDescription {
                id: format!("scan={}", i + 1),
                index: i,
                ms_level: 1,
                ..Default::default()
            };
            description.scans.push(ScanEvent {
                start_time: i as f64,
                ..Default::default()
            });
            let peaks = vec![CentroidPeak::new(100.0 + i as f64, (i + 1) as f32)];
            experiment.push(Spectrum::with_peaks(description, peaks));
        }
        let sink = File::create(path).unwrap();
        let mut writer = MzMLWriter::new(sink);
        writer.write_experiment(&experiment).unwrap();
    }

    #[test]
    fn test_random_access_is_stable_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.mzML");
        write_experiment(&path, 5);

        let mut ondisc = OnDiscMSExperiment::open(&path).unwrap();
        assert_eq!(ondisc.len(), 5);

        // Out-of-order access works and yields the right spectra.
        let s3 = ondisc.get_spectrum(3).unwrap().unwrap();
        assert_eq!(s3.id(), "scan=4");
        assert_eq!(s3.peaks[0].mz, 103.0);
        let s0 = ondisc.get_spectrum(0).unwrap().unwrap();
        assert_eq!(s0.id(), "scan=1");

        let ids: Vec<String> = ondisc.spectrum_ids().map(|s| s.to_string()).collect();
        drop(ondisc);

        let mut reopened = OnDiscMSExperiment::open(&path).unwrap();
        let ids_again: Vec<String> =
            reopened.spectrum_ids().map(|s| s.to_string()).collect();
        assert_eq!(ids, ids_again);
        let by_id = reopened.get_spectrum_by_id("scan=2").unwrap().unwrap();
        assert_eq!(by_id.peaks[0].mz, 101.0);
        assert!(reopened.get_spectrum_by_id("scan=99").unwrap().is_none());
    }

    #[test]
    fn test_metadata_only_access() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.mzML");
        write_experiment(&path, 2);
        let ondisc = OnDiscMSExperiment::open(&path).unwrap();
        // Metadata is available without touching any spectrum.
        assert!(ondisc.settings().run_id.is_some());
        assert_eq!(ondisc.chromatogram_count(), 0);
    }
}
