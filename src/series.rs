use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::dictionary::tag_for_keyword;
use crate::enums::{ExtraKeyword, LoadAttribute};
use crate::error::SeriesError;
use crate::extractor::{DicomObject, FileLocator, LoadAttributes, element_to_string};
use crate::pixel::{Image, decode_image};

/// Identifier used for files without a series instance UID.
pub const UNKNOWN_SERIES_ID: &str = "???";

/// Cached result of decoding one file, `None` if it has no usable image.
pub type PixelEntry = Option<Arc<Image>>;

/// Temporal sampling of a series as (start, interval, count).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimestepSpec {
    pub start: f64,
    pub interval: f64,
    pub count: usize,
}

impl TimestepSpec {
    /// Build the spec from the time value of every file.
    ///
    /// Only distinct values count. No values, or only the value 0, means the
    /// series carries no timing data. A single distinct value gives a zero
    /// interval.
    pub fn from_times(times: impl IntoIterator<Item = i64>) -> Self {
        let distinct: BTreeSet<i64> = times.into_iter().collect();
        let times: Vec<i64> = distinct.into_iter().collect();

        match times.as_slice() {
            [] | [0] => TimestepSpec::default(),
            [only] => TimestepSpec {
                start: *only as f64,
                interval: 0.0,
                count: 1,
            },
            [first, .., last] => {
                // mean of consecutive differences, in f64 so extreme values cannot overflow
                let span = *last as f64 - *first as f64;
                TimestepSpec {
                    start: *first as f64,
                    interval: span / (times.len() - 1) as f64,
                    count: times.len(),
                }
            }
        }
    }
}

impl fmt::Display for TimestepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "start: {}, interval: {}, # Steps: {}",
            self.start, self.interval, self.count
        )
    }
}

/// The files of one acquisition series, with lazily filled caches of their
/// parsed headers and decoded pixel data.
///
/// Files and load attributes are only appended while a source is being
/// ingested. Afterwards the series is shared read-only, and only the caches
/// change. Cache entries are never evicted or recomputed.
pub struct Series {
    series_id: String,
    root: PathBuf,
    files: Vec<FileLocator>,
    load_attrs: Vec<LoadAttributes>,
    temporal_attribute: LoadAttribute,
    attr_cache: RwLock<HashMap<usize, Arc<DicomObject>>>,
    pixel_cache: RwLock<HashMap<usize, PixelEntry>>,
}

impl Series {
    pub fn new(series_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            series_id: series_id.into(),
            root: root.into(),
            files: Vec::new(),
            load_attrs: Vec::new(),
            temporal_attribute: LoadAttribute::default(),
            attr_cache: RwLock::new(HashMap::new()),
            pixel_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Use `attr` instead of the trigger time for the timestep spec.
    pub fn with_temporal_attribute(mut self, attr: LoadAttribute) -> Self {
        self.temporal_attribute = attr;
        self
    }

    pub fn temporal_attribute(&self) -> LoadAttribute {
        self.temporal_attribute
    }

    pub fn series_id(&self) -> &str {
        &self.series_id
    }

    /// The source root this series was found under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[FileLocator] {
        &self.files
    }

    pub fn load_attrs(&self) -> &[LoadAttributes] {
        &self.load_attrs
    }

    /// Display names of the files, in series order.
    pub fn filenames(&self) -> Vec<String> {
        self.files.iter().map(FileLocator::name).collect()
    }

    pub fn add_file(&mut self, file: FileLocator, load_attrs: LoadAttributes) {
        self.files.push(file);
        self.load_attrs.push(load_attrs);
    }

    /// Append a file whose header and pixel data are already known.
    pub fn add_file_cached(
        &mut self,
        file: FileLocator,
        load_attrs: LoadAttributes,
        object: DicomObject,
        image: Option<Image>,
    ) {
        let index = self.files.len();
        self.add_file(file, load_attrs);
        self.attr_cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, Arc::new(object));
        self.pixel_cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, image.map(Arc::new));
    }

    /// Append every file of `other`, without its cached data.
    pub fn add_series(&mut self, other: &Series) {
        for (file, load_attrs) in other.files.iter().zip(&other.load_attrs) {
            self.add_file(file.clone(), load_attrs.clone());
        }
    }

    /// Sort files and load attributes jointly by file name.
    ///
    /// Entries already cached move along with their file.
    pub fn sort_files(&mut self) {
        let names = self.filenames();
        let mut order: Vec<usize> = (0..self.files.len()).collect();
        order.sort_by(|&a, &b| names[a].cmp(&names[b]));

        let mut new_index = vec![0; order.len()];
        for (new, &old) in order.iter().enumerate() {
            new_index[old] = new;
        }

        let mut files: Vec<Option<FileLocator>> = self.files.drain(..).map(Some).collect();
        let mut load_attrs: Vec<Option<LoadAttributes>> =
            self.load_attrs.drain(..).map(Some).collect();
        for &old in &order {
            if let (Some(file), Some(attrs)) = (files[old].take(), load_attrs[old].take()) {
                self.files.push(file);
                self.load_attrs.push(attrs);
            }
        }

        remap_keys(
            self.attr_cache.get_mut().unwrap_or_else(PoisonError::into_inner),
            &new_index,
        );
        remap_keys(
            self.pixel_cache.get_mut().unwrap_or_else(PoisonError::into_inner),
            &new_index,
        );
    }

    fn check_index(&self, index: usize) -> Result<&FileLocator, SeriesError> {
        self.files.get(index).ok_or(SeriesError::IndexOutOfRange {
            index,
            len: self.files.len(),
        })
    }

    /// Header of the file at `index`, parsed on first access and cached.
    ///
    /// # Arguments
    ///
    /// * `index` - Position of the file in series order
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range or the file cannot be read
    /// or parsed. Failures are not cached, a later call tries again
    pub fn get_attr_object(&self, index: usize) -> Result<Arc<DicomObject>, SeriesError> {
        let file = self.check_index(index)?;

        if let Some(object) = self
            .attr_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index)
        {
            return Ok(Arc::clone(object));
        }

        let object = file.read_header().map_err(|err| {
            warn!("Could not read attributes of {}: {}", file, err);
            err
        })?;

        let mut cache = self.attr_cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(index).or_insert_with(|| Arc::new(object))))
    }

    /// Rescaled pixel data of the file at `index`, decoded on first access.
    ///
    /// Files without decodable pixel data are cached as `None`.
    ///
    /// # Errors
    ///
    /// Returns error only if `index` is out of range
    pub fn get_pixel_data(&self, index: usize) -> Result<PixelEntry, SeriesError> {
        let file = self.check_index(index)?;

        if let Some(entry) = self
            .pixel_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index)
        {
            return Ok(entry.clone());
        }

        let image = match file.read_full() {
            Ok(object) => decode_image(&object).map(Arc::new),
            Err(err) => {
                debug!("Could not load pixel data of {}: {}", file, err);
                None
            }
        };

        let mut cache = self.pixel_cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(cache.entry(index).or_insert(image).clone())
    }

    /// Timestep spec over the temporal attribute of every file.
    pub fn get_timestep_spec(&self) -> TimestepSpec {
        self.timestep_spec_for(self.temporal_attribute)
    }

    /// Timestep spec over `attr`, missing or non-numeric values count as 0.
    pub fn timestep_spec_for(&self, attr: LoadAttribute) -> TimestepSpec {
        TimestepSpec::from_times(self.load_attrs.iter().map(|attrs| {
            attrs
                .get(&attr)
                .and_then(|value| value.trim().parse::<f64>().ok())
                .map_or(0, |value| value as i64)
        }))
    }

    /// Values derived from the whole series rather than read from a file.
    pub fn extra_attr_values(&self) -> HashMap<ExtraKeyword, String> {
        let spec = self.get_timestep_spec();
        HashMap::from([
            (ExtraKeyword::NumImages, self.files.len().to_string()),
            (ExtraKeyword::TimestepSpec, spec.to_string()),
            (ExtraKeyword::StartTime, spec.start.to_string()),
            (ExtraKeyword::NumTimesteps, spec.count.to_string()),
            (ExtraKeyword::TimeInterval, spec.interval.to_string()),
        ])
    }

    /// Values of the keywords in `names` for the file at `index`.
    ///
    /// Each keyword is looked up in the file's header first and in the
    /// derived values second; unknown keywords give an empty string. A
    /// series without files yields no values at all.
    pub fn get_attr_values<S: AsRef<str>>(
        &self,
        names: &[S],
        index: usize,
    ) -> Result<Vec<String>, SeriesError> {
        if self.files.is_empty() {
            return Ok(Vec::new());
        }

        let object = self.get_attr_object(index)?;
        let extras = self.extra_attr_values();

        Ok(names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                tag_for_keyword(name)
                    .and_then(|tag| object.element(tag).ok())
                    .and_then(element_to_string)
                    .or_else(|| {
                        ExtraKeyword::from_keyword(name)
                            .and_then(|extra| extras.get(&extra).cloned())
                    })
                    .unwrap_or_default()
            })
            .collect())
    }
}

impl fmt::Debug for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Series")
            .field("series_id", &self.series_id)
            .field("root", &self.root)
            .field("files", &self.files.len())
            .finish_non_exhaustive()
    }
}

fn remap_keys<V>(cache: &mut HashMap<usize, V>, new_index: &[usize]) {
    let entries: Vec<(usize, V)> = cache.drain().collect();
    cache.extend(
        entries
            .into_iter()
            .filter_map(|(old, value)| new_index.get(old).map(|&new| (new, value))),
    );
}
