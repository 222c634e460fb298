//! Indexed mzML emission.
//!
//! The writer emits the document in order, records the byte offset of each
//! `<spectrum>`/`<chromatogram>` start tag, and finishes with an
//! `<indexList>`, `<indexListOffset>` and `<fileChecksum>` trailer when
//! indexing is enabled.
use std::io::{self, BufWriter, Seek, Write};

use log::warn;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use sha1::{Digest, Sha1};
use thiserror::Error;

use super::super::offset_index::OffsetIndex;
use crate::experiment::{ExperimentalSettings, MSExperiment};
use crate::params::{ControlledVocabulary, Param, Unit};
use crate::spectrum::bindata::{
    ArrayRetrievalError, ArrayType, BinaryDataArrayType, CompressionConfig, DataArray,
};
use crate::spectrum::{
    Chromatogram, ChromatogramType, Precursor, ScanPolarity, Spectrum,
};

const BUFFER_SIZE: usize = 10000;

macro_rules! bstart {
    ($e:expr) => {
        BytesStart::new($e)
    };
}

// Attribute values are pushed owned so short-lived strings can be used
// without tying the element's lifetime to them.
macro_rules! attrib {
    ($name:expr, $value:expr, $elt:ident) => {
        $elt.push_attribute(quick_xml::events::attributes::Attribute {
            key: quick_xml::name::QName($name.as_bytes()),
            value: std::borrow::Cow::Owned($value.to_string().into_bytes()),
        });
    };
}

macro_rules! start_event {
    ($writer:ident, $target:ident) => {
        $writer
            .handle
            .write_event(Event::Start($target.borrow()))?;
    };
}

macro_rules! end_event {
    ($writer:ident, $target:ident) => {
        $writer.handle.write_event(Event::End($target.to_end()))?;
    };
}

#[derive(Debug, Error)]
pub enum MzMLWriterError {
    #[error("An XML error occurred: {0}")]
    Xml(String),
    #[error("An I/O error occurred: {0}")]
    Io(#[from] io::Error),
    #[error("An array encoding error occurred: {0}")]
    Array(#[from] ArrayRetrievalError),
    #[error("Document structure error: {0}")]
    State(String),
}

impl From<quick_xml::Error> for MzMLWriterError {
    fn from(value: quick_xml::Error) -> Self {
        MzMLWriterError::Xml(value.to_string())
    }
}

pub type WriterResult = Result<(), MzMLWriterError>;

/// A writable stream that keeps a running SHA-1 digest of all bytes, for
/// the `<fileChecksum>` trailer.
struct Sha1HashingStream<W: Write> {
    stream: W,
    hasher: Sha1,
}

impl<W: Write> Sha1HashingStream<W> {
    fn new(stream: W) -> Self {
        Self {
            stream,
            hasher: Sha1::new(),
        }
    }

    fn hexdigest(&self) -> String {
        self.hasher
            .clone()
            .finalize()
            .iter()
            .fold(String::with_capacity(40), |mut acc, b| {
                acc.push_str(&format!("{:02x}", b));
                acc
            })
    }
}

impl<W: Write> Write for Sha1HashingStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.stream.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl<W: Write + Seek> Seek for Sha1HashingStream<W> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.stream.seek(pos)
    }
}

/// The stages of document construction, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
enum MzMLWriterState {
    #[default]
    Start,
    SpectrumList,
    ChromatogramList,
    MzMLClosed,
    End,
}

/// Writes an experiment out as (indexed) mzML.
pub struct MzMLWriter<W: Write + Seek> {
    handle: Writer<BufWriter<Sha1HashingStream<W>>>,
    state: MzMLWriterState,
    /// Whether to append the index trailer at close time
    pub write_index: bool,
    pub mz_compression: CompressionConfig,
    pub intensity_compression: CompressionConfig,
    pub mz_dtype: BinaryDataArrayType,
    pub intensity_dtype: BinaryDataArrayType,
    spectrum_offset_index: OffsetIndex,
    chromatogram_offset_index: OffsetIndex,
    spectrum_counter: usize,
    chromatogram_counter: usize,
    declared_spectrum_count: usize,
    declared_chromatogram_count: usize,
}

impl<W: Write + Seek> MzMLWriter<W> {
    pub fn new(sink: W) -> Self {
        let stream = Sha1HashingStream::new(sink);
        Self {
            handle: Writer::new(BufWriter::with_capacity(BUFFER_SIZE, stream)),
            state: MzMLWriterState::Start,
            write_index: true,
            mz_compression: CompressionConfig::zlib(),
            intensity_compression: CompressionConfig::zlib(),
            mz_dtype: BinaryDataArrayType::Float64,
            intensity_dtype: BinaryDataArrayType::Float32,
            spectrum_offset_index: OffsetIndex::new("spectrum".into()),
            chromatogram_offset_index: OffsetIndex::new("chromatogram".into()),
            spectrum_counter: 0,
            chromatogram_counter: 0,
            declared_spectrum_count: 0,
            declared_chromatogram_count: 0,
        }
    }

    /// The current absolute position in the output stream.
    fn stream_position(&mut self) -> Result<u64, MzMLWriterError> {
        // The buffered bytes have to land first for the position to mean
        // anything.
        self.handle.get_mut().flush()?;
        Ok(self.handle.get_mut().get_mut().stream.stream_position()?)
    }

    fn write_param(&mut self, param: &Param) -> WriterResult {
        let mut elt = if let Some(curie) = param.curie() {
            let mut elt = bstart!("cvParam");
            let accession = curie.to_string();
            attrib!("cvRef", param.controlled_vocabulary.unwrap().prefix(), elt);
            attrib!("accession", accession, elt);
            elt
        } else {
            bstart!("userParam")
        };
        attrib!("name", param.name, elt);
        if !param.value.is_empty() {
            attrib!("value", param.value, elt);
        }
        if param.unit != Unit::Unknown {
            let (unit_acc, unit_name) = param.unit.for_param();
            let (cv_ref, _) = unit_acc.split_once(':').unwrap_or(("UO", ""));
            attrib!("unitCvRef", cv_ref.to_string(), elt);
            attrib!("unitAccession", unit_acc.to_string(), elt);
            attrib!("unitName", unit_name.to_string(), elt);
        }
        self.handle.write_event(Event::Empty(elt))?;
        Ok(())
    }

    fn write_param_list<'a, I: Iterator<Item = &'a Param>>(&mut self, params: I) -> WriterResult {
        for param in params {
            self.write_param(param)?;
        }
        Ok(())
    }

    /// Emit the document header: declarations, file description, software,
    /// instrument configurations, data processing, and open the run.
    pub fn write_header(&mut self, experiment: &MSExperiment) -> WriterResult {
        if self.state != MzMLWriterState::Start {
            return Err(MzMLWriterError::State(
                "header may only be written once, at the start".into(),
            ));
        }
        self.declared_spectrum_count = experiment.len();
        self.declared_chromatogram_count = experiment.chromatograms.len();

        self.handle
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        if self.write_index {
            let mut indexed = bstart!("indexedmzML");
            attrib!(
                "xmlns",
                "http://psi.hupo.org/ms/mzml".to_string(),
                indexed
            );
            self.handle.write_event(Event::Start(indexed.borrow()))?;
        }
        let mut mzml = bstart!("mzML");
        attrib!("xmlns", "http://psi.hupo.org/ms/mzml", mzml);
        attrib!("version", "1.1.0", mzml);
        self.handle.write_event(Event::Start(mzml.borrow()))?;

        self.write_cv_list()?;
        self.write_file_description(&experiment.settings)?;
        self.write_software_list(&experiment.settings)?;
        self.write_instrument_configuration_list(&experiment.settings)?;
        self.write_data_processing_list(&experiment.settings)?;

        let mut run = bstart!("run");
        let run_id = experiment
            .settings
            .run_id
            .clone()
            .unwrap_or_else(|| "run".to_string());
        attrib!("id", run_id, run);
        if let Some(sf) = experiment.settings.file_description.source_files.first() {
            attrib!("defaultSourceFileRef", sf.id, run);
        }
        self.handle.write_event(Event::Start(run.borrow()))?;

        let mut list = bstart!("spectrumList");
        let count = self.declared_spectrum_count.to_string();
        attrib!("count", count, list);
        self.handle.write_event(Event::Start(list.borrow()))?;
        self.state = MzMLWriterState::SpectrumList;
        Ok(())
    }

    fn write_cv_list(&mut self) -> WriterResult {
        let mut cv_list = bstart!("cvList");
        attrib!("count", "2", cv_list);
        start_event!(self, cv_list);
        let mut cv = bstart!("cv");
        attrib!("id", "MS", cv);
        attrib!(
            "fullName",
            "Proteomics Standards Initiative Mass Spectrometry Ontology".to_string(),
            cv
        );
        attrib!(
            "URI",
            "https://raw.githubusercontent.com/HUPO-PSI/psi-ms-CV/master/psi-ms.obo".to_string(),
            cv
        );
        self.handle.write_event(Event::Empty(cv))?;
        let mut cv = bstart!("cv");
        attrib!("id", "UO", cv);
        attrib!("fullName", "Unit Ontology", cv);
        attrib!(
            "URI",
            "http://ontologies.berkeleybop.org/uo.obo".to_string(),
            cv
        );
        self.handle.write_event(Event::Empty(cv))?;
        end_event!(self, cv_list);
        Ok(())
    }

    fn write_file_description(&mut self, settings: &ExperimentalSettings) -> WriterResult {
        let fd_tag = bstart!("fileDescription");
        start_event!(self, fd_tag);
        let content_tag = bstart!("fileContent");
        start_event!(self, content_tag);
        self.write_param_list(settings.file_description.contents.iter())?;
        end_event!(self, content_tag);
        if !settings.file_description.source_files.is_empty() {
            let mut list = bstart!("sourceFileList");
            let count = settings.file_description.source_files.len().to_string();
            attrib!("count", count, list);
            start_event!(self, list);
            for sf in settings.file_description.source_files.iter() {
                let mut tag = bstart!("sourceFile");
                attrib!("id", sf.id, tag);
                attrib!("name", sf.name, tag);
                attrib!("location", sf.location, tag);
                self.handle.write_event(Event::Start(tag.borrow()))?;
                if let Some(p) = &sf.file_format {
                    self.write_param(p)?;
                }
                if let Some(p) = &sf.id_format {
                    self.write_param(p)?;
                }
                self.write_param_list(sf.params.iter())?;
                self.handle.write_event(Event::End(tag.to_end()))?;
            }
            end_event!(self, list);
        }
        end_event!(self, fd_tag);
        Ok(())
    }

    fn write_software_list(&mut self, settings: &ExperimentalSettings) -> WriterResult {
        let mut list = bstart!("softwareList");
        let count = settings.softwares.len().to_string();
        attrib!("count", count, list);
        start_event!(self, list);
        for software in settings.softwares.iter() {
            let mut tag = bstart!("software");
            attrib!("id", software.id, tag);
            attrib!("version", software.version, tag);
            self.handle.write_event(Event::Start(tag.borrow()))?;
            self.write_param_list(software.params.iter())?;
            self.handle.write_event(Event::End(tag.to_end()))?;
        }
        end_event!(self, list);
        Ok(())
    }

    fn write_instrument_configuration_list(
        &mut self,
        settings: &ExperimentalSettings,
    ) -> WriterResult {
        let mut list = bstart!("instrumentConfigurationList");
        let count = settings.instrument_configurations.len().to_string();
        attrib!("count", count, list);
        start_event!(self, list);
        for config in settings.instrument_configurations.iter() {
            let mut tag = bstart!("instrumentConfiguration");
            let id = format!("IC{}", config.id);
            attrib!("id", id, tag);
            self.handle.write_event(Event::Start(tag.borrow()))?;
            self.write_param_list(config.params.iter())?;
            let mut component_list = bstart!("componentList");
            let count = config.components.len().to_string();
            attrib!("count", count, component_list);
            start_event!(self, component_list);
            for component in config.components.iter() {
                let name = match component.component_type {
                    crate::meta::ComponentType::IonSource => "source",
                    crate::meta::ComponentType::Analyzer => "analyzer",
                    crate::meta::ComponentType::Detector => "detector",
                    crate::meta::ComponentType::Unknown => continue,
                };
                let mut ctag = bstart!(name);
                let order = component.order.to_string();
                attrib!("order", order, ctag);
                self.handle.write_event(Event::Start(ctag.borrow()))?;
                self.write_param_list(component.params.iter())?;
                self.handle.write_event(Event::End(ctag.to_end()))?;
            }
            end_event!(self, component_list);
            if !config.software_reference.is_empty() {
                let mut sw = bstart!("softwareRef");
                attrib!("ref", config.software_reference, sw);
                self.handle.write_event(Event::Empty(sw))?;
            }
            self.handle.write_event(Event::End(tag.to_end()))?;
        }
        end_event!(self, list);
        Ok(())
    }

    fn write_data_processing_list(&mut self, settings: &ExperimentalSettings) -> WriterResult {
        let mut list = bstart!("dataProcessingList");
        let count = settings.data_processing.len().max(1).to_string();
        attrib!("count", count, list);
        start_event!(self, list);
        if settings.data_processing.is_empty() {
            // The schema requires at least one entry.
            let mut tag = bstart!("dataProcessing");
            attrib!("id", "default_processing", tag);
            self.handle.write_event(Event::Start(tag.borrow()))?;
            self.handle.write_event(Event::End(tag.to_end()))?;
        }
        for dp in settings.data_processing.iter() {
            let mut tag = bstart!("dataProcessing");
            attrib!("id", dp.id, tag);
            self.handle.write_event(Event::Start(tag.borrow()))?;
            for method in dp.iter() {
                let mut mtag = bstart!("processingMethod");
                let order = method.order.to_string();
                attrib!("order", order, mtag);
                attrib!("softwareRef", method.software_reference, mtag);
                self.handle.write_event(Event::Start(mtag.borrow()))?;
                self.write_param_list(method.params.iter())?;
                self.handle.write_event(Event::End(mtag.to_end()))?;
            }
            self.handle.write_event(Event::End(tag.to_end()))?;
        }
        end_event!(self, list);
        Ok(())
    }

    fn write_precursor(&mut self, precursor: &Precursor) -> WriterResult {
        let mut precursor_list_tag = bstart!("precursorList");
        attrib!("count", "1", precursor_list_tag);
        start_event!(self, precursor_list_tag);

        let mut precursor_tag = bstart!("precursor");
        if let Some(id) = &precursor.precursor_id {
            attrib!("spectrumRef", id, precursor_tag);
        }
        self.handle
            .write_event(Event::Start(precursor_tag.borrow()))?;

        let iw = &precursor.isolation_window;
        let iw_tag = bstart!("isolationWindow");
        start_event!(self, iw_tag);
        self.write_param(
            &ControlledVocabulary::MS
                .param_val(1000827, "isolation window target m/z", iw.target)
                .with_unit(Unit::MZ),
        )?;
        self.write_param(
            &ControlledVocabulary::MS
                .param_val(1000828, "isolation window lower offset", iw.lower_offset)
                .with_unit(Unit::MZ),
        )?;
        self.write_param(
            &ControlledVocabulary::MS
                .param_val(1000829, "isolation window upper offset", iw.upper_offset)
                .with_unit(Unit::MZ),
        )?;
        end_event!(self, iw_tag);

        let mut si_list = bstart!("selectedIonList");
        attrib!("count", "1", si_list);
        start_event!(self, si_list);
        let si_tag = bstart!("selectedIon");
        start_event!(self, si_tag);
        self.write_param(
            &ControlledVocabulary::MS
                .param_val(1000744, "selected ion m/z", precursor.ion.mz)
                .with_unit(Unit::MZ),
        )?;
        if precursor.ion.intensity != 0.0 {
            self.write_param(
                &ControlledVocabulary::MS
                    .param_val(1000042, "peak intensity", precursor.ion.intensity)
                    .with_unit(Unit::DetectorCounts),
            )?;
        }
        if let Some(charge) = precursor.ion.charge {
            self.write_param(&ControlledVocabulary::MS.param_val(
                1000041,
                "charge state",
                charge,
            ))?;
        }
        self.write_param_list(precursor.ion.params.iter())?;
        end_event!(self, si_tag);
        end_event!(self, si_list);

        let act = &precursor.activation;
        let act_tag = bstart!("activation");
        start_event!(self, act_tag);
        for method in act.methods.iter() {
            self.write_param(&method.to_param())?;
        }
        if act.energy != 0.0 {
            self.write_param(
                &ControlledVocabulary::MS
                    .param_val(1000045, "collision energy", act.energy)
                    .with_unit(Unit::Electronvolt),
            )?;
        }
        self.write_param_list(act.params.iter())?;
        end_event!(self, act_tag);

        self.handle
            .write_event(Event::End(precursor_tag.to_end()))?;
        end_event!(self, precursor_list_tag);
        Ok(())
    }

    fn write_binary_data_array(
        &mut self,
        array: &DataArray,
        config: CompressionConfig,
    ) -> WriterResult {
        let (text, mode) = array.encode_bytestring(config)?;
        let mut bda = bstart!("binaryDataArray");
        let encoded_len = text.len().to_string();
        attrib!("encodedLength", encoded_len, bda);
        self.handle.write_event(Event::Start(bda.borrow()))?;
        if let Some(p) = array.dtype.as_param() {
            self.write_param(&p.into())?;
        }
        if let Some(p) = mode.as_param() {
            self.write_param(&p.into())?;
        }
        self.write_param(&array.name.as_param(Some(array.unit)))?;
        let binary_tag = bstart!("binary");
        start_event!(self, binary_tag);
        self.handle.write_event(Event::Text(BytesText::new(
            std::str::from_utf8(&text).expect("base64 output is always ASCII"),
        )))?;
        end_event!(self, binary_tag);
        self.handle.write_event(Event::End(bda.to_end()))?;
        Ok(())
    }

    /// Write one spectrum, recording its start-tag byte offset.
    pub fn write_spectrum(&mut self, spectrum: &Spectrum) -> WriterResult {
        if self.state != MzMLWriterState::SpectrumList {
            return Err(MzMLWriterError::State(format!(
                "cannot write a spectrum in state {:?}",
                self.state
            )));
        }
        let offset = self.stream_position()?;
        self.spectrum_offset_index.insert(spectrum.id(), offset);

        let mut tag = bstart!("spectrum");
        let index = self.spectrum_counter.to_string();
        attrib!("index", index, tag);
        attrib!("id", spectrum.description.id, tag);
        let default_len = spectrum.len().to_string();
        attrib!("defaultArrayLength", default_len, tag);
        self.handle.write_event(Event::Start(tag.borrow()))?;

        let ms_level = spectrum.ms_level();
        self.write_param(&ControlledVocabulary::MS.param_val(1000511, "ms level", ms_level))?;
        if ms_level == 1 {
            self.write_param(&ControlledVocabulary::MS.param(1000579, "MS1 spectrum"))?;
        } else {
            self.write_param(&ControlledVocabulary::MS.param(1000580, "MSn spectrum"))?;
        }
        match spectrum.polarity() {
            ScanPolarity::Positive => {
                self.write_param(&ControlledVocabulary::MS.param(1000130, "positive scan"))?
            }
            ScanPolarity::Negative => {
                self.write_param(&ControlledVocabulary::MS.param(1000129, "negative scan"))?
            }
            ScanPolarity::Unknown => {}
        }
        if spectrum.description.zoom_scan {
            self.write_param(&ControlledVocabulary::MS.param(1000497, "zoom scan"))?;
        }
        self.write_param(&ControlledVocabulary::MS.param(1000127, "centroid spectrum"))?;
        self.write_param_list(spectrum.description.params.iter())?;

        let mut scan_list_tag = bstart!("scanList");
        let scan_count = spectrum.description.scans.len().max(1).to_string();
        attrib!("count", scan_count, scan_list_tag);
        start_event!(self, scan_list_tag);
        self.write_param(&ControlledVocabulary::MS.param(1000795, "no combination"))?;
        for scan in spectrum.description.scans.iter() {
            let mut scan_tag = bstart!("scan");
            let ic_ref = format!("IC{}", scan.instrument_configuration_id);
            attrib!("instrumentConfigurationRef", ic_ref, scan_tag);
            self.handle.write_event(Event::Start(scan_tag.borrow()))?;
            self.write_param(
                &ControlledVocabulary::MS
                    .param_val(1000016, "scan start time", scan.start_time)
                    .with_unit(Unit::Second),
            )?;
            if scan.injection_time != 0.0 {
                self.write_param(
                    &ControlledVocabulary::MS
                        .param_val(1000927, "ion injection time", scan.injection_time)
                        .with_unit(Unit::Millisecond),
                )?;
            }
            self.write_param_list(scan.params.iter())?;
            if !scan.scan_windows.is_empty() {
                let mut swl = bstart!("scanWindowList");
                let count = scan.scan_windows.len().to_string();
                attrib!("count", count, swl);
                start_event!(self, swl);
                for window in scan.scan_windows.iter() {
                    let sw = bstart!("scanWindow");
                    start_event!(self, sw);
                    self.write_param(
                        &ControlledVocabulary::MS
                            .param_val(1000501, "scan window lower limit", window.lower_bound)
                            .with_unit(Unit::MZ),
                    )?;
                    self.write_param(
                        &ControlledVocabulary::MS
                            .param_val(1000500, "scan window upper limit", window.upper_bound)
                            .with_unit(Unit::MZ),
                    )?;
                    end_event!(self, sw);
                }
                end_event!(self, swl);
            }
            self.handle.write_event(Event::End(scan_tag.to_end()))?;
        }
        end_event!(self, scan_list_tag);

        for precursor in spectrum.description.precursors.iter() {
            self.write_precursor(precursor)?;
        }

        let mzs: Vec<f64> = spectrum.peaks.iter().map(|p| p.mz).collect();
        let intensities: Vec<f32> = spectrum.peaks.iter().map(|p| p.intensity).collect();
        let mz_array = match self.mz_dtype {
            BinaryDataArrayType::Float32 => {
                let narrowed: Vec<f32> = mzs.iter().map(|v| *v as f32).collect();
                DataArray::from_f32(&ArrayType::MZArray, &narrowed)
            }
            _ => DataArray::from_f64(&ArrayType::MZArray, &mzs),
        };
        let intensity_array = match self.intensity_dtype {
            BinaryDataArrayType::Float64 => {
                let widened: Vec<f64> = intensities.iter().map(|v| *v as f64).collect();
                DataArray::from_f64(&ArrayType::IntensityArray, &widened)
            }
            _ => DataArray::from_f32(&ArrayType::IntensityArray, &intensities),
        };

        let array_count = 2 + spectrum.float_arrays.len();
        let mut bdal = bstart!("binaryDataArrayList");
        let count = array_count.to_string();
        attrib!("count", count, bdal);
        start_event!(self, bdal);
        self.write_binary_data_array(&mz_array, self.mz_compression)?;
        self.write_binary_data_array(&intensity_array, self.intensity_compression)?;
        for aux in spectrum.float_arrays.iter() {
            if aux.data.len() != spectrum.len() {
                warn!(
                    "auxiliary array '{}' has {} entries for {} peaks; writing as-is",
                    aux.name,
                    aux.data.len(),
                    spectrum.len()
                );
            }
            let array = DataArray::from_f32(&ArrayType::nonstandard(&aux.name), &aux.data);
            self.write_binary_data_array(&array, CompressionConfig::none())?;
        }
        end_event!(self, bdal);

        self.handle.write_event(Event::End(tag.to_end()))?;
        self.spectrum_counter += 1;
        Ok(())
    }

    /// Write one chromatogram, recording its start-tag byte offset. Closes
    /// the spectrum list if it is still open.
    pub fn write_chromatogram(&mut self, chromatogram: &Chromatogram) -> WriterResult {
        match self.state {
            MzMLWriterState::SpectrumList => {
                self.close_spectrum_list()?;
                self.open_chromatogram_list()?;
            }
            MzMLWriterState::ChromatogramList => {}
            _ => {
                return Err(MzMLWriterError::State(format!(
                    "cannot write a chromatogram in state {:?}",
                    self.state
                )))
            }
        }
        let offset = self.stream_position()?;
        self.chromatogram_offset_index
            .insert(chromatogram.id(), offset);

        let mut tag = bstart!("chromatogram");
        let index = self.chromatogram_counter.to_string();
        attrib!("index", index, tag);
        attrib!("id", chromatogram.description.id, tag);
        let default_len = chromatogram.len().to_string();
        attrib!("defaultArrayLength", default_len, tag);
        self.handle.write_event(Event::Start(tag.borrow()))?;

        match chromatogram.description.chromatogram_type {
            ChromatogramType::TotalIonCurrent => self.write_param(
                &ControlledVocabulary::MS.param(1000235, "total ion current chromatogram"),
            )?,
            ChromatogramType::SelectedReactionMonitoring => self.write_param(
                &ControlledVocabulary::MS.param(1001473, "selected reaction monitoring chromatogram"),
            )?,
            ChromatogramType::BasePeak => self
                .write_param(&ControlledVocabulary::MS.param(1000628, "basepeak chromatogram"))?,
            ChromatogramType::Unknown => {}
        }
        self.write_param_list(chromatogram.description.params.iter())?;
        if let Some(precursor) = &chromatogram.description.precursor {
            self.write_precursor(precursor)?;
        }

        let times: Vec<f64> = chromatogram.peaks.iter().map(|p| p.time).collect();
        let intensities: Vec<f32> = chromatogram.peaks.iter().map(|p| p.intensity).collect();
        let time_array = DataArray::from_f64(&ArrayType::TimeArray, &times);
        let intensity_array = DataArray::from_f32(&ArrayType::IntensityArray, &intensities);

        let mut bdal = bstart!("binaryDataArrayList");
        attrib!("count", "2", bdal);
        start_event!(self, bdal);
        self.write_binary_data_array(&time_array, self.mz_compression)?;
        self.write_binary_data_array(&intensity_array, self.intensity_compression)?;
        end_event!(self, bdal);

        self.handle.write_event(Event::End(tag.to_end()))?;
        self.chromatogram_counter += 1;
        Ok(())
    }

    fn close_spectrum_list(&mut self) -> WriterResult {
        if self.spectrum_counter != self.declared_spectrum_count {
            warn!(
                "spectrumList declared {} entries but {} were written",
                self.declared_spectrum_count, self.spectrum_counter
            );
        }
        self.handle
            .write_event(Event::End(BytesEnd::new("spectrumList")))?;
        Ok(())
    }

    fn open_chromatogram_list(&mut self) -> WriterResult {
        let mut list = bstart!("chromatogramList");
        let count = self.declared_chromatogram_count.to_string();
        attrib!("count", count, list);
        self.handle.write_event(Event::Start(list.borrow()))?;
        self.state = MzMLWriterState::ChromatogramList;
        Ok(())
    }

    fn close_run(&mut self) -> WriterResult {
        match self.state {
            MzMLWriterState::SpectrumList => {
                self.close_spectrum_list()?;
            }
            MzMLWriterState::ChromatogramList => {
                self.handle
                    .write_event(Event::End(BytesEnd::new("chromatogramList")))?;
            }
            _ => {}
        }
        self.handle.write_event(Event::End(BytesEnd::new("run")))?;
        self.handle.write_event(Event::End(BytesEnd::new("mzML")))?;
        self.state = MzMLWriterState::MzMLClosed;
        Ok(())
    }

    fn write_index(&mut self, index: &OffsetIndex) -> WriterResult {
        let mut tag = bstart!("index");
        attrib!("name", index.name, tag);
        self.handle.write_event(Event::Start(tag.borrow()))?;
        if index.is_empty() {
            // An indexList block is structurally required even with nothing
            // to point at; a sentinel entry marks it as deliberately empty.
            let mut off = bstart!("offset");
            attrib!("idRef", "", off);
            self.handle.write_event(Event::Start(off.borrow()))?;
            self.handle
                .write_event(Event::Text(BytesText::new("-1")))?;
            self.handle.write_event(Event::End(off.to_end()))?;
        }
        for (id, offset) in index.iter() {
            let mut off = bstart!("offset");
            let id = id.to_string();
            attrib!("idRef", id, off);
            self.handle.write_event(Event::Start(off.borrow()))?;
            self.handle
                .write_event(Event::Text(BytesText::new(&offset.to_string())))?;
            self.handle.write_event(Event::End(off.to_end()))?;
        }
        self.handle.write_event(Event::End(tag.to_end()))?;
        Ok(())
    }

    fn write_index_list(&mut self) -> WriterResult {
        let index_list_offset = self.stream_position()?;
        let mut list = bstart!("indexList");
        attrib!("count", "2", list);
        self.handle.write_event(Event::Start(list.borrow()))?;
        let spectrum_index = self.spectrum_offset_index.clone();
        let chromatogram_index = self.chromatogram_offset_index.clone();
        self.write_index(&spectrum_index)?;
        self.write_index(&chromatogram_index)?;
        self.handle.write_event(Event::End(list.to_end()))?;

        let tag = bstart!("indexListOffset");
        start_event!(self, tag);
        self.handle.write_event(Event::Text(BytesText::new(
            &index_list_offset.to_string(),
        )))?;
        end_event!(self, tag);

        let tag = bstart!("fileChecksum");
        start_event!(self, tag);
        self.handle.get_mut().flush()?;
        let digest = self.handle.get_mut().get_ref().hexdigest();
        self.handle
            .write_event(Event::Text(BytesText::new(&digest)))?;
        end_event!(self, tag);
        Ok(())
    }

    /// Finish the document. Emits the index trailer when `write_index` is
    /// set. Further writes are rejected.
    pub fn close(&mut self) -> WriterResult {
        if self.state >= MzMLWriterState::End {
            return Ok(());
        }
        if self.state < MzMLWriterState::MzMLClosed {
            self.close_run()?;
        }
        if self.write_index {
            self.write_index_list()?;
            self.handle
                .write_event(Event::End(BytesEnd::new("indexedmzML")))?;
        }
        self.handle.get_mut().flush()?;
        self.state = MzMLWriterState::End;
        Ok(())
    }

    /// Write a whole experiment: header, every spectrum, every
    /// chromatogram, trailer.
    pub fn write_experiment(&mut self, experiment: &MSExperiment) -> WriterResult {
        self.write_header(experiment)?;
        for spectrum in experiment.iter() {
            self.write_spectrum(spectrum)?;
        }
        for chromatogram in experiment.chromatograms.iter() {
            self.write_chromatogram(chromatogram)?;
        }
        self.close()
    }

    pub fn spectrum_offset_index(&self) -> &OffsetIndex {
        &self.spectrum_offset_index
    }
}

impl<W: Write + Seek> Drop for MzMLWriter<W> {
    fn drop(&mut self) {
        if self.state < MzMLWriterState::End {
            if let Err(e) = self.close() {
                warn!("failed to close mzML document on drop: {}", e);
            }
        }
    }
}
