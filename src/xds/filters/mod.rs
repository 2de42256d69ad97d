//! Filter construction utilities shared across chain builders.
//!
//! Filter modules follow a consistent pattern: high-level builder functions
//! convert mesh policy and chain parameters into Envoy protobuf messages,
//! wrapped as `google.protobuf.Any` payloads.

pub mod http;
pub mod network;

use envoy_types::pb::envoy::config::accesslog::v3::{
    access_log::ConfigType as AccessLogConfigType, AccessLog,
};
use envoy_types::pb::envoy::config::core::v3::{
    substitution_format_string::Format, SubstitutionFormatString,
};
use envoy_types::pb::envoy::config::listener::v3::{
    listener_filter::ConfigType as ListenerFilterConfigType, ListenerFilter,
};
use envoy_types::pb::envoy::extensions::access_loggers::file::v3::{
    file_access_log::AccessLogFormat, FileAccessLog,
};
use envoy_types::pb::envoy::extensions::filters::listener::http_inspector::v3::HttpInspector;
use envoy_types::pb::envoy::extensions::filters::listener::tls_inspector::v3::TlsInspector;
use envoy_types::pb::google::protobuf::Any;
use prost::Message;

use crate::config::MeshConfig;

pub const TLS_INSPECTOR_FILTER_NAME: &str = "envoy.filters.listener.tls_inspector";
pub const HTTP_INSPECTOR_FILTER_NAME: &str = "envoy.filters.listener.http_inspector";
pub const FILE_ACCESS_LOG_NAME: &str = "envoy.access_loggers.file";

const TLS_INSPECTOR_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.listener.tls_inspector.v3.TlsInspector";
const HTTP_INSPECTOR_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.listener.http_inspector.v3.HttpInspector";
const FILE_ACCESS_LOG_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.access_loggers.file.v3.FileAccessLog";

/// Helper for building Envoy `Any` values from prost messages.
pub fn any_from_message<M: Message>(type_url: impl Into<String>, msg: &M) -> Any {
    Any { type_url: type_url.into(), value: msg.encode_to_vec() }
}

/// The inspector listener filters required by protocol sniffing, in the fixed
/// order the data plane expects: TLS inspection first, then HTTP.
pub fn inspector_listener_filters() -> Vec<ListenerFilter> {
    vec![
        ListenerFilter {
            name: TLS_INSPECTOR_FILTER_NAME.to_string(),
            config_type: Some(ListenerFilterConfigType::TypedConfig(any_from_message(
                TLS_INSPECTOR_TYPE_URL,
                &TlsInspector::default(),
            ))),
            ..Default::default()
        },
        ListenerFilter {
            name: HTTP_INSPECTOR_FILTER_NAME.to_string(),
            config_type: Some(ListenerFilterConfigType::TypedConfig(any_from_message(
                HTTP_INSPECTOR_TYPE_URL,
                &HttpInspector::default(),
            ))),
            ..Default::default()
        },
    ]
}

/// Access log entry for a terminal proxy filter, derived from the current
/// mesh policy. Returns `None` when access logging is disabled. Rebuilt from
/// the snapshot on every call so a format change is reflected on the next
/// push.
pub fn access_log(mesh: &MeshConfig) -> Option<AccessLog> {
    if mesh.access_log_file.is_empty() {
        return None;
    }

    let mut file_log =
        FileAccessLog { path: mesh.access_log_file.clone(), access_log_format: None };

    if let Some(format) = &mesh.access_log_format {
        file_log.access_log_format = Some(AccessLogFormat::LogFormat(SubstitutionFormatString {
            format: Some(Format::TextFormat(format.clone())),
            ..Default::default()
        }));
    }

    Some(AccessLog {
        name: FILE_ACCESS_LOG_NAME.to_string(),
        filter: None,
        config_type: Some(AccessLogConfigType::TypedConfig(any_from_message(
            FILE_ACCESS_LOG_TYPE_URL,
            &file_log,
        ))),
    })
}
