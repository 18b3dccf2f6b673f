use stack_string::StackString;

use sync_lib::metric_types::MetricType;

use crate::gfit_model::{
    GfitApplication, GfitDataSource, GfitDataType, GfitDataTypeField, GfitDevice,
};

pub const APPLICATION_NAME: &str = "fitbit-gfit-sync";
/// Also the app prefix of every session id.
pub const DEVICE_UID: &str = "io.fitbit-gfit-sync";

/// Static data source descriptor for a metric stream. The serialized fields
/// become part of the data source id, do NOT change any of them after the
/// first sync or new writes land in a fresh untracked stream.
pub fn get_data_source(metric: MetricType) -> GfitDataSource {
    GfitDataSource {
        source_type: "raw".into(),
        application: GfitApplication {
            name: APPLICATION_NAME.into(),
        },
        data_type: GfitDataType {
            name: metric.data_type_name().into(),
            field: vec![GfitDataTypeField {
                name: metric.field_name().into(),
                format: metric.field_format().into(),
            }],
        },
        device: GfitDevice {
            device_type: "watch".into(),
            manufacturer: "fitbit".into(),
            model: metric.device_model().into(),
            uid: DEVICE_UID.into(),
            version: "1".into(),
        },
    }
}

/// Deterministic external id of the metric stream, recomputed every run.
pub fn get_data_source_id(metric: MetricType, project_number: &str) -> StackString {
    let data_source = get_data_source(metric);
    format!(
        "{}:{}:{}:{}:{}:{}",
        data_source.source_type,
        data_source.data_type.name,
        project_number,
        data_source.device.manufacturer,
        data_source.device.model,
        data_source.device.uid
    )
    .into()
}
