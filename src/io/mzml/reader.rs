//! Streaming mzML parsing.
//!
//! The reader walks the document event-by-event, building spectra and
//! chromatograms as their elements close. It is tolerant of being dropped
//! into the middle of a document: parsing may begin directly at a
//! `<spectrum>` start tag, which is what the on-disc experiment does after
//! seeking to an indexed offset.
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::super::offset_index::OffsetIndex;
use crate::experiment::{ExperimentalSettings, MSExperiment};
use crate::meta::{
    Component, ComponentType, DataProcessing, InstrumentConfiguration, ProcessingMethod, Software,
    SourceFile,
};
use crate::params::{ControlledVocabulary, Param, Unit};
use crate::peaks::{CentroidPeak, TimeIntensityPeak};
use crate::spectrum::bindata::{
    ArrayRetrievalError, ArrayType, BinaryArrayMap, BinaryCompressionType, BinaryDataArrayType,
    DataArray,
};
use crate::spectrum::{
    Chromatogram, ChromatogramDescription, ChromatogramType, Spectrum, DissociationMethod,
    IsolationWindow, Precursor, ScanEvent, ScanPolarity, ScanWindow, SpectrumDescription,
};

#[derive(Debug, Error)]
pub enum MzMLParserError {
    #[error("An XML error occurred: {0}")]
    Xml(String),
    #[error("An I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
    #[error("An array decoding error occurred: {0}")]
    Array(#[from] ArrayRetrievalError),
    #[error("Malformed mzML: {0}")]
    Malformed(String),
}

impl From<quick_xml::Error> for MzMLParserError {
    fn from(value: quick_xml::Error) -> Self {
        MzMLParserError::Xml(value.to_string())
    }
}

/// Which sub-element params currently belong to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ParamContext {
    #[default]
    Other,
    FileContent,
    SourceFile,
    Software,
    InstrumentConfiguration,
    InstrumentComponent,
    ProcessingMethod,
    SpectrumTop,
    Scan,
    ScanWindow,
    IsolationWindow,
    SelectedIon,
    Activation,
    BinaryDataArray,
    ChromatogramTop,
}

#[derive(Debug, Default)]
struct EntryBuilder {
    spectrum: Option<SpectrumDescription>,
    chromatogram: Option<ChromatogramDescription>,
    arrays: BinaryArrayMap,
    current_array: Option<DataArray>,
    declared_array_length: usize,
    precursor: Option<Precursor>,
    in_binary: bool,
}

/// A streaming reader over an mzML document.
pub struct MzMLReader<R: BufRead> {
    handle: Reader<R>,
    buffer: Vec<u8>,
    context: ParamContext,
    builder: EntryBuilder,
    /// Run-level metadata, complete once the first spectrum has been seen
    pub settings: ExperimentalSettings,
    /// When set, only spectra at these MS levels are materialized
    pub ms_level_filter: Option<Vec<u8>>,
    spectrum_count: usize,
    finished: bool,
}

impl MzMLReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, MzMLParserError> {
        let handle = File::open(path.as_ref())?;
        Ok(Self::from_reader(BufReader::new(handle)))
    }
}

impl<R: BufRead> MzMLReader<R> {
    pub fn from_reader(source: R) -> Self {
        let mut handle = Reader::from_reader(source);
        handle.trim_text(true);
        Self {
            handle,
            buffer: Vec::new(),
            context: ParamContext::Other,
            builder: EntryBuilder::default(),
            settings: ExperimentalSettings::default(),
            ms_level_filter: None,
            spectrum_count: 0,
            finished: false,
        }
    }

    /// Restrict materialization to the given MS levels.
    pub fn set_ms_level_filter<I: IntoIterator<Item = u8>>(&mut self, levels: I) {
        self.ms_level_filter = Some(levels.into_iter().collect());
    }

    fn parse_param(start: &BytesStart) -> Result<Param, MzMLParserError> {
        let mut param = Param::new();
        param.name = get_attr(start, b"name")?.unwrap_or_default();
        param.value = get_attr(start, b"value")?.unwrap_or_default();
        if start.name().as_ref() == b"cvParam" {
            if let Some(accession) = get_attr(start, b"accession")? {
                if let Some((prefix, number)) = accession.split_once(':') {
                    param.controlled_vocabulary = prefix.parse::<ControlledVocabulary>().ok();
                    param.accession = number.parse().ok();
                }
            }
            if let Some(unit_acc) = get_attr(start, b"unitAccession")? {
                param.unit = Unit::from_accession(&unit_acc);
            }
        }
        Ok(param)
    }

    /// A scan start time in seconds regardless of the declared unit.
    fn time_in_seconds(param: &Param) -> f64 {
        let value: f64 = param.parse().unwrap_or_default();
        match param.unit {
            Unit::Minute => value * 60.0,
            Unit::Millisecond => value / 1000.0,
            _ => value,
        }
    }

    fn handle_start(&mut self, start: &BytesStart, empty: bool) -> Result<(), MzMLParserError> {
        match start.name().as_ref() {
            b"run" => {
                self.settings.run_id = get_attr(start, b"id")?;
            }
            b"fileContent" => self.context = ParamContext::FileContent,
            b"sourceFile" => {
                self.context = ParamContext::SourceFile;
                let sf = SourceFile::new(
                    &get_attr(start, b"name")?.unwrap_or_default(),
                    &get_attr(start, b"location")?.unwrap_or_default(),
                    &get_attr(start, b"id")?.unwrap_or_default(),
                );
                self.settings.file_description.source_files.push(sf);
            }
            b"software" => {
                self.context = ParamContext::Software;
                self.settings.softwares.push(Software::new(
                    &get_attr(start, b"id")?.unwrap_or_default(),
                    &get_attr(start, b"version")?.unwrap_or_default(),
                ));
            }
            b"instrumentConfiguration" => {
                self.context = ParamContext::InstrumentConfiguration;
                let id_text = get_attr(start, b"id")?.unwrap_or_default();
                let id = id_text
                    .trim_start_matches(|c: char| !c.is_ascii_digit())
                    .parse()
                    .unwrap_or_default();
                self.settings
                    .instrument_configurations
                    .push(InstrumentConfiguration {
                        id,
                        ..Default::default()
                    });
            }
            b"source" | b"analyzer" | b"detector" => {
                if let Some(config) = self.settings.instrument_configurations.last_mut() {
                    self.context = ParamContext::InstrumentComponent;
                    let component_type = match start.name().as_ref() {
                        b"source" => ComponentType::IonSource,
                        b"analyzer" => ComponentType::Analyzer,
                        _ => ComponentType::Detector,
                    };
                    let order = get_attr(start, b"order")?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or_default();
                    config.components.push(Component {
                        component_type,
                        order,
                        ..Default::default()
                    });
                }
            }
            b"softwareRef" => {
                if let Some(config) = self.settings.instrument_configurations.last_mut() {
                    config.software_reference =
                        get_attr(start, b"ref")?.unwrap_or_default();
                }
            }
            b"dataProcessing" => {
                self.settings.data_processing.push(DataProcessing {
                    id: get_attr(start, b"id")?.unwrap_or_default(),
                    ..Default::default()
                });
            }
            b"processingMethod" => {
                self.context = ParamContext::ProcessingMethod;
                if let Some(dp) = self.settings.data_processing.last_mut() {
                    dp.push(ProcessingMethod {
                        order: get_attr(start, b"order")?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or_default(),
                        software_reference: get_attr(start, b"softwareRef")?
                            .unwrap_or_default(),
                        ..Default::default()
                    });
                }
            }
            b"spectrum" => {
                self.context = ParamContext::SpectrumTop;
                let mut description = SpectrumDescription {
                    id: get_attr(start, b"id")?.unwrap_or_default(),
                    index: get_attr(start, b"index")?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(self.spectrum_count),
                    ..Default::default()
                };
                if description.id.is_empty() {
                    description.id = format!("index={}", description.index);
                }
                self.builder.declared_array_length = get_attr(start, b"defaultArrayLength")?
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_default();
                self.builder.spectrum = Some(description);
            }
            b"chromatogram" => {
                self.context = ParamContext::ChromatogramTop;
                let description = ChromatogramDescription {
                    id: get_attr(start, b"id")?.unwrap_or_default(),
                    index: get_attr(start, b"index")?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or_default(),
                    ..Default::default()
                };
                self.builder.declared_array_length = get_attr(start, b"defaultArrayLength")?
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_default();
                self.builder.chromatogram = Some(description);
            }
            b"scan" => {
                self.context = ParamContext::Scan;
                if let Some(spectrum) = self.builder.spectrum.as_mut() {
                    let instrument_configuration_id = get_attr(
                        start,
                        b"instrumentConfigurationRef",
                    )?
                    .map(|v| {
                        v.trim_start_matches(|c: char| !c.is_ascii_digit())
                            .parse()
                            .unwrap_or_default()
                    })
                    .unwrap_or_default();
                    spectrum.scans.push(ScanEvent {
                        instrument_configuration_id,
                        ..Default::default()
                    });
                }
            }
            b"scanWindow" => {
                self.context = ParamContext::ScanWindow;
                if let Some(scan) = self
                    .builder
                    .spectrum
                    .as_mut()
                    .and_then(|s| s.scans.last_mut())
                {
                    scan.scan_windows.push(ScanWindow::default());
                }
            }
            b"precursor" => {
                self.builder.precursor = Some(Precursor {
                    precursor_id: get_attr(start, b"spectrumRef")?,
                    ..Default::default()
                });
            }
            b"isolationWindow" => self.context = ParamContext::IsolationWindow,
            b"selectedIon" => self.context = ParamContext::SelectedIon,
            b"activation" => self.context = ParamContext::Activation,
            b"binaryDataArray" => {
                self.context = ParamContext::BinaryDataArray;
                self.builder.current_array = Some(DataArray::new());
            }
            b"binary" => {
                self.builder.in_binary = true;
                if empty {
                    self.builder.in_binary = false;
                }
            }
            b"cvParam" | b"userParam" => {
                let param = Self::parse_param(start)?;
                self.dispatch_param(param);
            }
            _ => {}
        }
        Ok(())
    }

    fn dispatch_param(&mut self, param: Param) {
        let accession = param.accession.unwrap_or_default();
        match self.context {
            ParamContext::FileContent => {
                self.settings.file_description.contents.push(param);
            }
            ParamContext::SourceFile => {
                if let Some(sf) = self.settings.file_description.source_files.last_mut() {
                    sf.params.push(param);
                }
            }
            ParamContext::Software => {
                if let Some(sw) = self.settings.softwares.last_mut() {
                    sw.params.push(param);
                }
            }
            ParamContext::InstrumentConfiguration => {
                if let Some(config) = self.settings.instrument_configurations.last_mut() {
                    config.params.push(param);
                }
            }
            ParamContext::InstrumentComponent => {
                if let Some(component) = self
                    .settings
                    .instrument_configurations
                    .last_mut()
                    .and_then(|c| c.components.last_mut())
                {
                    component.params.push(param);
                }
            }
            ParamContext::ProcessingMethod => {
                if let Some(method) = self
                    .settings
                    .data_processing
                    .last_mut()
                    .and_then(|dp| dp.methods.last_mut())
                {
                    method.params.push(param);
                }
            }
            ParamContext::SpectrumTop => {
                let Some(spectrum) = self.builder.spectrum.as_mut() else {
                    return;
                };
                match accession {
                    1000511 => spectrum.ms_level = param.parse().unwrap_or_default(),
                    1000130 => spectrum.polarity = ScanPolarity::Positive,
                    1000129 => spectrum.polarity = ScanPolarity::Negative,
                    1000497 => spectrum.zoom_scan = true,
                    // "MS1 spectrum", "MSn spectrum", "centroid spectrum":
                    // implied by the description fields, not retained.
                    1000579 | 1000580 | 1000127 | 1000128 => {}
                    _ => spectrum.params.push(param),
                }
            }
            ParamContext::Scan => {
                let Some(scan) = self
                    .builder
                    .spectrum
                    .as_mut()
                    .and_then(|s| s.scans.last_mut())
                else {
                    return;
                };
                match accession {
                    1000016 => scan.start_time = Self::time_in_seconds(&param),
                    1000927 => scan.injection_time = param.parse().unwrap_or_default(),
                    _ => scan.params.push(param),
                }
            }
            ParamContext::ScanWindow => {
                let Some(window) = self
                    .builder
                    .spectrum
                    .as_mut()
                    .and_then(|s| s.scans.last_mut())
                    .and_then(|s| s.scan_windows.last_mut())
                else {
                    return;
                };
                match accession {
                    1000501 => window.lower_bound = param.parse().unwrap_or_default(),
                    1000500 => window.upper_bound = param.parse().unwrap_or_default(),
                    _ => {}
                }
            }
            ParamContext::IsolationWindow => {
                let Some(precursor) = self.builder.precursor.as_mut() else {
                    return;
                };
                let window: &mut IsolationWindow = &mut precursor.isolation_window;
                match accession {
                    1000827 => window.target = param.parse().unwrap_or_default(),
                    1000828 => window.lower_offset = param.parse().unwrap_or_default(),
                    1000829 => window.upper_offset = param.parse().unwrap_or_default(),
                    _ => {}
                }
            }
            ParamContext::SelectedIon => {
                let Some(precursor) = self.builder.precursor.as_mut() else {
                    return;
                };
                match accession {
                    1000744 => precursor.ion.mz = param.parse().unwrap_or_default(),
                    1000041 => precursor.ion.charge = param.parse().ok(),
                    1000042 => precursor.ion.intensity = param.parse().unwrap_or_default(),
                    _ => precursor.ion.params.push(param),
                }
            }
            ParamContext::Activation => {
                let Some(precursor) = self.builder.precursor.as_mut() else {
                    return;
                };
                if let Some(method) = DissociationMethod::from_accession(accession) {
                    precursor.activation.methods.push(method);
                } else if accession == 1000045 {
                    precursor.activation.energy = param.parse().unwrap_or_default();
                } else {
                    precursor.activation.params.push(param);
                }
            }
            ParamContext::BinaryDataArray => {
                let Some(array) = self.builder.current_array.as_mut() else {
                    return;
                };
                if let Some(dtype) = BinaryDataArrayType::from_accession(accession) {
                    array.dtype = dtype;
                } else if let Some(mode) = BinaryCompressionType::from_accession(accession) {
                    array.compression = mode;
                } else if let Some(kind) = ArrayType::from_accession(accession, &param.value) {
                    array.unit = param.unit;
                    array.name = kind;
                } else {
                    array.params.push(param);
                }
            }
            ParamContext::ChromatogramTop => {
                let Some(chromatogram) = self.builder.chromatogram.as_mut() else {
                    return;
                };
                match accession {
                    1000235 => {
                        chromatogram.chromatogram_type = ChromatogramType::TotalIonCurrent
                    }
                    1000628 => chromatogram.chromatogram_type = ChromatogramType::BasePeak,
                    1001473 => {
                        chromatogram.chromatogram_type =
                            ChromatogramType::SelectedReactionMonitoring
                    }
                    1000130 => chromatogram.polarity = ScanPolarity::Positive,
                    1000129 => chromatogram.polarity = ScanPolarity::Negative,
                    _ => chromatogram.params.push(param),
                }
            }
            ParamContext::Other => {}
        }
    }

    fn handle_end(&mut self, name: &[u8]) -> Result<Option<ParsedEntry>, MzMLParserError> {
        match name {
            b"scan" | b"scanList" => self.context = ParamContext::SpectrumTop,
            b"scanWindow" | b"scanWindowList" => self.context = ParamContext::Scan,
            b"isolationWindow" | b"selectedIonList" | b"selectedIon" | b"activation" => {
                self.context = if self.builder.spectrum.is_some() {
                    ParamContext::SpectrumTop
                } else {
                    ParamContext::ChromatogramTop
                }
            }
            b"precursor" => {
                let precursor = self.builder.precursor.take();
                if let Some(precursor) = precursor {
                    if let Some(spectrum) = self.builder.spectrum.as_mut() {
                        spectrum.precursors.push(precursor);
                    } else if let Some(chromatogram) = self.builder.chromatogram.as_mut() {
                        chromatogram.precursor = Some(precursor);
                    }
                }
            }
            b"binary" => self.builder.in_binary = false,
            b"binaryDataArray" => {
                self.context = if self.builder.spectrum.is_some() {
                    ParamContext::SpectrumTop
                } else {
                    ParamContext::ChromatogramTop
                };
                if let Some(array) = self.builder.current_array.take() {
                    array.check_declared_length(self.builder.declared_array_length)?;
                    self.builder.arrays.add(array);
                }
            }
            b"spectrum" => {
                self.context = ParamContext::Other;
                return Ok(self.finish_spectrum()?.map(ParsedEntry::Spectrum));
            }
            b"chromatogram" => {
                self.context = ParamContext::Other;
                return Ok(self.finish_chromatogram()?.map(ParsedEntry::Chromatogram));
            }
            b"spectrumList" => self.context = ParamContext::Other,
            _ => {}
        }
        Ok(None)
    }

    fn finish_spectrum(&mut self) -> Result<Option<Spectrum>, MzMLParserError> {
        let Some(description) = self.builder.spectrum.take() else {
            return Ok(None);
        };
        let arrays = std::mem::take(&mut self.builder.arrays);
        self.spectrum_count += 1;

        if let Some(filter) = &self.ms_level_filter {
            if !filter.contains(&description.ms_level) {
                return Ok(None);
            }
        }

        let mut spectrum = Spectrum::new(description);
        let mzs = match arrays.mzs() {
            Ok(v) => v.into_owned(),
            Err(ArrayRetrievalError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let intensities = match arrays.intensities() {
            Ok(v) => v.into_owned(),
            Err(ArrayRetrievalError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if mzs.len() != intensities.len() {
            warn!(
                "spectrum {} has {} m/z values and {} intensities; truncating to the shorter",
                spectrum.id(),
                mzs.len(),
                intensities.len()
            );
        }
        spectrum.peaks = mzs
            .iter()
            .zip(intensities.iter())
            .map(|(mz, intensity)| CentroidPeak::new(*mz, *intensity))
            .collect();

        for (name, array) in arrays.iter() {
            if let ArrayType::NonStandardDataArray { name } = name {
                let data = array.to_f32()?.into_owned();
                if data.len() != spectrum.len() {
                    warn!(
                        "auxiliary array '{}' in {} has {} entries for {} peaks; kept as observed",
                        name,
                        spectrum.id(),
                        data.len(),
                        spectrum.len()
                    );
                }
                spectrum
                    .float_arrays
                    .push(crate::spectrum::FloatDataArray {
                        name: name.to_string(),
                        data,
                    });
            }
        }
        Ok(Some(spectrum))
    }

    fn finish_chromatogram(&mut self) -> Result<Option<Chromatogram>, MzMLParserError> {
        let Some(description) = self.builder.chromatogram.take() else {
            return Ok(None);
        };
        let arrays = std::mem::take(&mut self.builder.arrays);
        let mut chromatogram = Chromatogram::new(description);
        let times = match arrays.times() {
            Ok(v) => v.into_owned(),
            Err(ArrayRetrievalError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let intensities = match arrays.intensities() {
            Ok(v) => v.into_owned(),
            Err(ArrayRetrievalError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        chromatogram.peaks = times
            .iter()
            .zip(intensities.iter())
            .map(|(time, intensity)| TimeIntensityPeak::new(*time, *intensity))
            .collect();
        Ok(Some(chromatogram))
    }

    fn handle_text(&mut self, text: &[u8]) -> Result<(), MzMLParserError> {
        if self.builder.in_binary {
            if let Some(array) = self.builder.current_array.as_mut() {
                // fill_from_encoded consumes the declared compression and
                // leaves the array stored decoded.
                if array.compression == BinaryCompressionType::Decoded {
                    array.compression = BinaryCompressionType::NoCompression;
                }
                array.fill_from_encoded(text)?;
            }
        }
        Ok(())
    }

    /// Pull events until the next complete spectrum or chromatogram.
    fn read_next_entry(&mut self) -> Result<Option<ParsedEntry>, MzMLParserError> {
        if self.finished {
            return Ok(None);
        }
        loop {
            self.buffer.clear();
            match self.handle.read_event_into(&mut self.buffer) {
                Ok(Event::Start(start)) => {
                    let start = start.into_owned();
                    self.handle_start(&start, false)?;
                }
                Ok(Event::Empty(start)) => {
                    let start = start.into_owned();
                    self.handle_start(&start, true)?;
                }
                Ok(Event::Text(text)) => {
                    let content = text.into_inner().into_owned();
                    self.handle_text(&content)?;
                }
                Ok(Event::End(end)) => {
                    let name = end.name().as_ref().to_vec();
                    if let Some(entry) = self.handle_end(&name)? {
                        return Ok(Some(entry));
                    }
                    if name == b"run" || name == b"mzML" {
                        self.finished = true;
                        return Ok(None);
                    }
                }
                Ok(Event::Eof) => {
                    self.finished = true;
                    return Ok(None);
                }
                Ok(_) => {}
                Err(e) => return Err(MzMLParserError::Xml(e.to_string())),
            }
        }
    }

    /// The next spectrum in the document, skipping chromatograms and
    /// filtered MS levels.
    pub fn read_next(&mut self) -> Result<Option<Spectrum>, MzMLParserError> {
        loop {
            match self.read_next_entry()? {
                Some(ParsedEntry::Spectrum(s)) => return Ok(Some(s)),
                Some(ParsedEntry::Chromatogram(_)) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Materialize the whole document into an [`MSExperiment`].
    pub fn read_experiment(&mut self) -> Result<MSExperiment, MzMLParserError> {
        let mut experiment = MSExperiment::new();
        loop {
            match self.read_next_entry()? {
                Some(ParsedEntry::Spectrum(s)) => experiment.push(s),
                Some(ParsedEntry::Chromatogram(c)) => experiment.chromatograms.push(c),
                None => break,
            }
        }
        experiment.settings = self.settings.clone();
        Ok(experiment)
    }
}

enum ParsedEntry {
    Spectrum(Spectrum),
    Chromatogram(Chromatogram),
}

impl<R: BufRead> Iterator for MzMLReader<R> {
    type Item = Spectrum;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().ok().flatten()
    }
}

/// How far back from the end of the file to look for `<indexListOffset>`.
const INDEX_TAIL_WINDOW: u64 = 1024;

/// Read the trailing `<indexList>` of an indexed mzML document. Falls back
/// to `None` when the document carries no (usable) index.
pub fn read_index_from_end<R: Read + Seek>(
    source: &mut R,
) -> Result<Option<(OffsetIndex, OffsetIndex)>, MzMLParserError> {
    let file_len = source.seek(SeekFrom::End(0))?;
    let window = INDEX_TAIL_WINDOW.min(file_len);
    source.seek(SeekFrom::End(-(window as i64)))?;
    let mut tail = String::new();
    source.take(window).read_to_string(&mut tail).map_err(|_| {
        MzMLParserError::Malformed("index trailer is not valid UTF-8".to_string())
    })?;

    let Some(start) = tail.find("<indexListOffset>") else {
        return Ok(None);
    };
    let Some(end) = tail.find("</indexListOffset>") else {
        return Ok(None);
    };
    let offset: u64 = match tail[start + "<indexListOffset>".len()..end].trim().parse() {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    source.seek(SeekFrom::Start(offset))?;
    let mut reader = Reader::from_reader(BufReader::new(source));
    reader.trim_text(true);
    let mut buffer = Vec::new();
    let mut spectrum_index = OffsetIndex::new("spectrum".into());
    let mut chromatogram_index = OffsetIndex::new("chromatogram".into());
    let mut current: Option<&mut OffsetIndex> = None;
    let mut current_id: Option<String> = None;

    loop {
        buffer.clear();
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(start)) => match start.name().as_ref() {
                b"index" => {
                    let name = get_attr(&start, b"name")?
                        .unwrap_or_default();
                    current = match name.as_str() {
                        "spectrum" => Some(&mut spectrum_index),
                        "chromatogram" => Some(&mut chromatogram_index),
                        _ => None,
                    };
                }
                b"offset" => {
                    current_id = get_attr(&start, b"idRef")?;
                }
                _ => {}
            },
            Ok(Event::Text(text)) => {
                if let (Some(index), Some(id)) = (current.as_deref_mut(), current_id.take()) {
                    if id.is_empty() {
                        // The sentinel entry of a deliberately empty index.
                        continue;
                    }
                    if let Ok(offset) = String::from_utf8_lossy(&text.into_inner()).trim().parse()
                    {
                        index.insert(id, offset);
                    }
                }
            }
            Ok(Event::End(end)) => {
                if end.name().as_ref() == b"indexList" {
                    break;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(MzMLParserError::Xml(e.to_string())),
        }
    }
    spectrum_index.init = true;
    chromatogram_index.init = true;
    Ok(Some((spectrum_index, chromatogram_index)))
}

/// Build spectrum/chromatogram offset indices by scanning the raw bytes for
/// start tags. Used when a document has no trailing index.
pub fn build_index_by_scan<R: Read + Seek>(
    source: &mut R,
) -> Result<(OffsetIndex, OffsetIndex), MzMLParserError> {
    source.seek(SeekFrom::Start(0))?;
    let mut content = Vec::new();
    source.read_to_end(&mut content)?;

    let mut spectrum_index = OffsetIndex::new("spectrum".into());
    let mut chromatogram_index = OffsetIndex::new("chromatogram".into());
    for (needle, index) in [
        (&b"<spectrum "[..], &mut spectrum_index),
        (&b"<chromatogram "[..], &mut chromatogram_index),
    ] {
        let mut position = 0;
        while let Some(found) = find_sub(&content[position..], needle) {
            let offset = position + found;
            if let Some(id) = extract_id_attr(&content[offset..]) {
                index.insert(id, offset as u64);
            }
            position = offset + needle.len();
        }
        index.init = true;
    }
    Ok((spectrum_index, chromatogram_index))
}

fn get_attr(start: &BytesStart, key: &[u8]) -> Result<Option<String>, MzMLParserError> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MzMLParserError::Xml(e.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| MzMLParserError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn find_sub(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn extract_id_attr(tag_start: &[u8]) -> Option<String> {
    let close = find_sub(tag_start, b">")?;
    let tag = &tag_start[..close];
    let id_at = find_sub(tag, b" id=\"")?;
    let rest = &tag[id_at + 5..];
    let end = find_sub(rest, b"\"")?;
    String::from_utf8(rest[..end].to_vec()).ok()
}
