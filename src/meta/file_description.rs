use crate::impl_param_described;
use crate::params::{ControlledVocabulary, Param, ParamDescribed, ParamList};

/// A file the data in this experiment was derived from.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SourceFile {
    /// The file's basename
    pub name: String,
    /// The URI of the directory the file lived in
    pub location: String,
    /// An identifier referenced by metadata that points here
    pub id: String,
    pub file_format: Option<Param>,
    pub id_format: Option<Param>,
    pub params: ParamList,
}

impl SourceFile {
    pub fn new(name: &str, location: &str, id: &str) -> Self {
        Self {
            name: name.to_string(),
            location: location.to_string(),
            id: id.to_string(),
            ..Default::default()
        }
    }

    /// The full path this source file entry refers to.
    pub fn path(&self) -> String {
        let dir = self
            .location
            .strip_prefix("file://")
            .unwrap_or(&self.location);
        if dir.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", dir.trim_end_matches('/'), self.name)
        }
    }
}

/// Describes the contents and provenance of the data file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FileDescription {
    /// Summary cvParams such as "MS1 spectrum" presence
    pub contents: ParamList,
    pub source_files: Vec<SourceFile>,
}

impl FileDescription {
    pub fn new(contents: ParamList, source_files: Vec<SourceFile>) -> Self {
        Self {
            contents,
            source_files,
        }
    }

    pub fn has_ms1_spectra(&self) -> bool {
        self.contents
            .iter()
            .any(|p| p.accession == Some(1000579))
    }

    pub fn has_msn_spectra(&self) -> bool {
        self.contents
            .iter()
            .any(|p| p.accession == Some(1000580))
    }

    pub fn mark_ms1_spectra(&mut self) {
        if !self.has_ms1_spectra() {
            self.contents
                .push(ControlledVocabulary::MS.param(1000579, "MS1 spectrum"));
        }
    }

    pub fn mark_msn_spectra(&mut self) {
        if !self.has_msn_spectra() {
            self.contents
                .push(ControlledVocabulary::MS.param(1000580, "MSn spectrum"));
        }
    }
}

impl_param_described!(SourceFile);

impl ParamDescribed for FileDescription {
    fn params(&self) -> &[Param] {
        &self.contents
    }

    fn params_mut(&mut self) -> &mut ParamList {
        &mut self.contents
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_source_file_path() {
        let sf = SourceFile::new("run1.mzML", "file:///data/raw/", "sf_1");
        assert_eq!(sf.path(), "/data/raw/run1.mzML");
        let bare = SourceFile::new("run1.mzML", "", "sf_1");
        assert_eq!(bare.path(), "run1.mzML");
    }

    #[test]
    fn test_content_marks() {
        let mut fd = FileDescription::default();
        assert!(!fd.has_ms1_spectra());
        fd.mark_ms1_spectra();
        fd.mark_ms1_spectra();
        assert!(fd.has_ms1_spectra());
        assert_eq!(fd.contents.len(), 1);
    }
}
