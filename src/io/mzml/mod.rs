//! mzML reading and writing, with spectrum-level random access through the
//! trailing index.
mod reader;
mod writer;

pub use reader::{build_index_by_scan, read_index_from_end, MzMLParserError, MzMLReader};
pub use writer::{MzMLWriter, MzMLWriterError, WriterResult};

#[cfg(test)]
mod test {
    use std::io::{Cursor, Seek, SeekFrom, Read};

    use super::*;
    use crate::experiment::MSExperiment;
    use crate::meta::SourceFile;
    use crate::peaks::CentroidPeak;
    use crate::spectrum::bindata::CompressionConfig;
    use crate::spectrum::{ScanEvent, Spectrum, SpectrumDescription};

    fn one_spectrum_experiment() -> MSExperiment {
        let mut experiment = MSExperiment::new();
        experiment
            .settings
            .file_description
            .source_files
            .push(SourceFile::new("input.raw", "file:///data", "sf_1"));
        let mut description = SpectrumDescription {
            id: "scan=1".to_string(),
            index: 0,
            ms_level: 1,
            polarity: crate::spectrum::ScanPolarity::Positive,
            ..Default::default()
        };
        description.scans.push(ScanEvent {
            start_time: 12.5,
            ..Default::default()
        });
        let peaks = vec![
            CentroidPeak::new(100.0, 1.0),
            CentroidPeak::new(200.0, 2.0),
            CentroidPeak::new(300.0, 3.0),
        ];
        experiment.push(Spectrum::with_peaks(description, peaks));
        experiment
    }

    #[test]
    fn test_round_trip_with_index() {
        let experiment = one_spectrum_experiment();
        let mut sink = Cursor::new(Vec::new());
        {
            let mut writer = MzMLWriter::new(&mut sink);
            writer.mz_compression = CompressionConfig::zlib();
            writer.intensity_compression = CompressionConfig::none();
            writer.write_experiment(&experiment).unwrap();
        }

        sink.seek(SeekFrom::Start(0)).unwrap();
        let mut text = String::new();
        sink.read_to_string(&mut text).unwrap();
        assert!(text.contains("<indexList"));
        assert!(text.contains("indexListOffset"));
        assert!(text.contains("fileChecksum"));

        let mut reader = MzMLReader::from_reader(Cursor::new(text.as_bytes()));
        let reloaded = reader.read_experiment().unwrap();
        assert_eq!(reloaded.len(), 1);
        let spectrum = reloaded.get(0).unwrap();
        assert_eq!(spectrum.id(), "scan=1");
        assert_eq!(spectrum.ms_level(), 1);
        assert!((spectrum.start_time() - 12.5).abs() < 1e-9);
        assert_eq!(spectrum.len(), 3);
        // m/z was written at 64-bit: exact. Intensity at 32-bit: single
        // precision tolerance.
        for (peak, (mz, intensity)) in spectrum
            .iter()
            .zip([(100.0f64, 1.0f32), (200.0, 2.0), (300.0, 3.0)])
        {
            assert_eq!(peak.mz, mz);
            assert!((peak.intensity - intensity).abs() < 1e-6);
        }
        assert_eq!(
            reloaded.primary_ms_run_path(),
            vec!["/data/input.raw".to_string()]
        );
    }

    #[test]
    fn test_trailing_index_points_at_spectrum_tags() {
        let experiment = one_spectrum_experiment();
        let mut sink = Cursor::new(Vec::new());
        {
            let mut writer = MzMLWriter::new(&mut sink);
            writer.write_experiment(&experiment).unwrap();
        }

        let (spectrum_index, _) = read_index_from_end(&mut sink).unwrap().unwrap();
        assert_eq!(spectrum_index.len(), 1);
        let offset = spectrum_index.get("scan=1").unwrap();
        sink.seek(SeekFrom::Start(offset)).unwrap();
        let mut probe = [0u8; 9];
        sink.read_exact(&mut probe).unwrap();
        assert_eq!(&probe, b"<spectrum");
    }

    #[test]
    fn test_index_by_scan_matches_trailing_index() {
        let experiment = one_spectrum_experiment();
        let mut sink = Cursor::new(Vec::new());
        {
            let mut writer = MzMLWriter::new(&mut sink);
            writer.write_experiment(&experiment).unwrap();
        }
        let (from_trailer, _) = read_index_from_end(&mut sink).unwrap().unwrap();
        let (from_scan, _) = build_index_by_scan(&mut sink).unwrap();
        assert_eq!(from_trailer.offsets, from_scan.offsets);
    }

    #[test]
    fn test_ms_level_filter() {
        let mut experiment = one_spectrum_experiment();
        let mut ms2 = Spectrum::default();
        ms2.description.id = "scan=2".to_string();
        ms2.description.index = 1;
        ms2.description.ms_level = 2;
        ms2.push(CentroidPeak::new(55.0, 5.0));
        experiment.push(ms2);

        let mut sink = Cursor::new(Vec::new());
        {
            let mut writer = MzMLWriter::new(&mut sink);
            writer.write_experiment(&experiment).unwrap();
        }
        sink.seek(SeekFrom::Start(0)).unwrap();
        let mut reader = MzMLReader::from_reader(sink);
        reader.set_ms_level_filter([1]);
        let reloaded = reader.read_experiment().unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(0).unwrap().ms_level(), 1);
    }

    #[test]
    fn test_empty_run_still_carries_index_list() {
        let experiment = MSExperiment::new();
        let mut sink = Cursor::new(Vec::new());
        {
            let mut writer = MzMLWriter::new(&mut sink);
            writer.write_experiment(&experiment).unwrap();
        }
        sink.seek(SeekFrom::Start(0)).unwrap();
        let mut text = String::new();
        sink.read_to_string(&mut text).unwrap();
        assert!(text.contains("<indexList"));
        // The sentinel offset marking a deliberately empty index.
        assert!(text.contains(">-1</offset>"));
    }
}
