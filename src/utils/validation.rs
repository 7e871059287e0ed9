use crate::utils::error::{PersistenceError, Result};
use std::path::{Component, Path};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_namespace_uri(field_name: &str, uri: &str) -> Result<()> {
    if uri.is_empty() {
        return Err(PersistenceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: uri.to_string(),
            reason: "Namespace URI cannot be empty".to_string(),
        });
    }

    match Url::parse(uri) {
        Ok(url) if url.cannot_be_a_base() && url.scheme() != "urn" => {
            Err(PersistenceError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: uri.to_string(),
                reason: "Namespace URI must be hierarchical or a URN".to_string(),
            })
        }
        Ok(_) => Ok(()),
        Err(e) => Err(PersistenceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: uri.to_string(),
            reason: format!("Invalid URI format: {}", e),
        }),
    }
}

/// header 與 property 名稱：非空、不含空白、冒號或逗號
pub fn validate_token(field_name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(PersistenceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty".to_string(),
        });
    }

    if let Some(bad) = value
        .chars()
        .find(|c| c.is_whitespace() || *c == ':' || *c == ',')
    {
        return Err(PersistenceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Character {:?} is not allowed", bad),
        });
    }

    Ok(())
}

/// 模組內的資源路徑必須是相對路徑，且不可跳出模組根目錄
pub fn validate_resource_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(PersistenceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(PersistenceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    let escapes = Path::new(path).components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(PersistenceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path must be relative to the module root".to_string(),
        });
    }

    Ok(())
}
