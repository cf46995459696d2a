//! Synthetic DICOM files for integration tests.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};

/// Description of one test image.
#[derive(Debug, Clone, Default)]
pub struct TestImage {
    pub series_uid: Option<String>,
    pub trigger_time: Option<String>,
    pub patient_name: Option<String>,
    pub series_description: Option<String>,
    pub rescale: Option<(String, String)>,
    /// rows, columns and row-major 16 bit values
    pub pixels: Option<(u16, u16, Vec<u16>)>,
}

impl TestImage {
    pub fn in_series(series_uid: &str) -> Self {
        Self {
            series_uid: Some(series_uid.to_string()),
            patient_name: Some("Doe^Jane".to_string()),
            ..Self::default()
        }
    }

    pub fn trigger_time(mut self, time: &str) -> Self {
        self.trigger_time = Some(time.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.series_description = Some(description.to_string());
        self
    }

    pub fn rescale(mut self, slope: &str, intercept: &str) -> Self {
        self.rescale = Some((slope.to_string(), intercept.to_string()));
        self
    }

    pub fn pixels(mut self, rows: u16, columns: u16, values: Vec<u16>) -> Self {
        assert_eq!(values.len(), rows as usize * columns as usize);
        self.pixels = Some((rows, columns, values));
        self
    }

    pub fn to_object(&self, instance_uid: &str) -> FileDicomObject<InMemDicomObject> {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            PrimitiveValue::from(uids::SECONDARY_CAPTURE_IMAGE_STORAGE),
        ));
        obj.put(DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(instance_uid),
        ));

        let strings = [
            (tags::SERIES_INSTANCE_UID, VR::UI, &self.series_uid),
            (tags::TRIGGER_TIME, VR::DS, &self.trigger_time),
            (tags::PATIENT_NAME, VR::PN, &self.patient_name),
            (tags::SERIES_DESCRIPTION, VR::LO, &self.series_description),
        ];
        for (tag, vr, value) in strings {
            if let Some(value) = value {
                obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value.as_str())));
            }
        }

        if let Some((slope, intercept)) = &self.rescale {
            obj.put(DataElement::new(
                tags::RESCALE_SLOPE,
                VR::DS,
                PrimitiveValue::from(slope.as_str()),
            ));
            obj.put(DataElement::new(
                tags::RESCALE_INTERCEPT,
                VR::DS,
                PrimitiveValue::from(intercept.as_str()),
            ));
        }

        if let Some((rows, columns, values)) = &self.pixels {
            let us = |tag, value: u16| DataElement::new(tag, VR::US, PrimitiveValue::from(value));
            obj.put(us(tags::SAMPLES_PER_PIXEL, 1));
            obj.put(DataElement::new(
                tags::PHOTOMETRIC_INTERPRETATION,
                VR::CS,
                PrimitiveValue::from("MONOCHROME2"),
            ));
            obj.put(us(tags::ROWS, *rows));
            obj.put(us(tags::COLUMNS, *columns));
            obj.put(us(tags::BITS_ALLOCATED, 16));
            obj.put(us(tags::BITS_STORED, 16));
            obj.put(us(tags::HIGH_BIT, 15));
            obj.put(us(tags::PIXEL_REPRESENTATION, 0));
            obj.put(DataElement::new(
                tags::PIXEL_DATA,
                VR::OW,
                PrimitiveValue::U16(values.iter().copied().collect()),
            ));
        }

        obj.with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(instance_uid),
        )
        .unwrap()
    }

    /// The complete file, preamble included.
    pub fn to_bytes(&self, instance_uid: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.to_object(instance_uid).write_all(&mut bytes).unwrap();
        bytes
    }

    pub fn write(&self, path: &Path) {
        let instance_uid = format!("2.25.{}", path.as_os_str().len());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        self.to_object(&instance_uid).write_to_file(path).unwrap();
    }
}

/// Write a zip archive holding `entries`, stored uncompressed.
pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    let options: zip::write::FileOptions<()> =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}
