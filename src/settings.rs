//! Sidecar settings documents shipped next to a client.
//!
//! Clients read their base URL from `AppSettings.xml`; later builds also read a
//! JSON flag map from `ClientSettings/ClientAppSettings.json`. Both are created
//! when missing and edited in place otherwise, keeping unrelated content.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::{disk::write_atomic, error::SettingsError};

pub const APP_SETTINGS_FILE: &str = "AppSettings.xml";
pub const CLIENT_SETTINGS_DIR: &str = "ClientSettings";
pub const CLIENT_APP_SETTINGS_FILE: &str = "ClientAppSettings.json";

/// Flag holding the domain session cookies are scoped to.
pub const COOKIE_DOMAIN_FLAG: &str = "FStringCookieDomain";

const SETTINGS: &str = "Settings";
const BASE_URL: &str = "BaseUrl";

/// Markup that can hold tag-like text without being an element.
const SKIPPED: [(&str, &str); 4] = [
    ("<!--", "-->"),
    ("<![CDATA[", "]]>"),
    ("<?", "?>"),
    ("<!", ">"),
];

pub fn base_url(domain: &str) -> String {
    format!("http://www.{domain}")
}

/// A fresh `AppSettings.xml`.
pub fn new_app_settings(base_url: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Settings>\n\
         \t<ContentFolder>content</ContentFolder>\n\
         \t<BaseUrl>{base_url}</BaseUrl>\n\
         </Settings>\n"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    SelfClosing,
}

#[derive(Debug)]
struct Tag<'a> {
    start: usize,
    end: usize,
    name: &'a str,
    kind: TagKind,
}

/// Next element tag at or after `pos`, stepping over comments, processing
/// instructions, CDATA and declarations.
fn next_tag(document: &str, mut pos: usize) -> Result<Option<Tag<'_>>, String> {
    while let Some(offset) = document[pos..].find('<') {
        let start = pos + offset;
        let rest = &document[start..];

        if let Some((open, close)) = SKIPPED.iter().find(|(open, _)| rest.starts_with(open)) {
            let len = rest[open.len()..]
                .find(close)
                .ok_or_else(|| format!("unterminated {open}"))?;
            pos = start + open.len() + len + close.len();
            continue;
        }

        let len = rest.find('>').ok_or_else(|| "unterminated tag".to_owned())?;
        let end = start + len + 1;
        let inner = &document[start + 1..end - 1];
        let (kind, inner) = if let Some(name) = inner.strip_prefix('/') {
            (TagKind::Close, name)
        } else if let Some(name) = inner.strip_suffix('/') {
            (TagKind::SelfClosing, name)
        } else {
            (TagKind::Open, inner)
        };
        let name = inner.split(char::is_whitespace).next().unwrap_or_default();

        return Ok(Some(Tag {
            start,
            end,
            name,
            kind,
        }));
    }
    Ok(None)
}

/// End offset of the element whose open tag ends at `pos`.
fn element_end(document: &str, mut pos: usize, name: &str) -> Result<usize, String> {
    let mut depth = 1usize;
    while let Some(tag) = next_tag(document, pos)? {
        pos = tag.end;
        match tag.kind {
            TagKind::Open => depth += 1,
            TagKind::SelfClosing => {}
            TagKind::Close => {
                depth -= 1;
                if depth == 0 && tag.name == name {
                    return Ok(tag.end);
                }
                if depth == 0 {
                    return Err(format!("<{name}> closed by </{}>", tag.name));
                }
            }
        }
    }
    Err(format!("unterminated <{name}> element"))
}

fn splice(document: &str, start: usize, end: usize, insert: &str) -> String {
    let mut updated = String::with_capacity(document.len() + insert.len());
    updated.push_str(&document[..start]);
    updated.push_str(insert);
    updated.push_str(&document[end..]);
    updated
}

/// Sets the `BaseUrl` child of the `Settings` root, adding it before the
/// closing `</Settings>` tag when absent. An existing element is replaced
/// whole, whatever its attributes or form. Everything else is kept verbatim.
pub fn set_base_url(document: &str, base_url: &str) -> Result<String, String> {
    let element = format!("<{BASE_URL}>{base_url}</{BASE_URL}>");
    let mut depth = 0usize;
    let mut pos = 0;

    while let Some(tag) = next_tag(document, pos)? {
        pos = tag.end;
        match (tag.kind, depth) {
            (TagKind::Open, 0) if tag.name == SETTINGS => depth = 1,
            (TagKind::Open | TagKind::SelfClosing, 0) => break,
            (TagKind::Close, 0) => return Err(format!("stray </{}> tag", tag.name)),
            (TagKind::SelfClosing, 1) if tag.name == BASE_URL => {
                return Ok(splice(document, tag.start, tag.end, &element));
            }
            (TagKind::Open, 1) if tag.name == BASE_URL => {
                let end = element_end(document, tag.end, BASE_URL)?;
                return Ok(splice(document, tag.start, end, &element));
            }
            (TagKind::Close, 1) => {
                let insert = format!("\t{element}\n");
                return Ok(splice(document, tag.start, tag.start, &insert));
            }
            (TagKind::Open, _) => depth += 1,
            (TagKind::Close, _) => depth -= 1,
            (TagKind::SelfClosing, _) => {}
        }
    }
    Err(format!("no </{SETTINGS}> element"))
}

/// A settings document computed in memory, ready to be written.
///
/// Building every update before the client binary is touched means a
/// malformed document fails the patch with nothing written.
#[derive(Debug, Clone)]
pub struct SettingsUpdate {
    path: PathBuf,
    contents: String,
    summary: String,
}

impl SettingsUpdate {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// Writes the document, creating its directory if needed.
    pub fn write(&self) -> Result<&Path, SettingsError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|source| SettingsError::Io {
                path: dir.to_owned(),
                source,
            })?;
        }
        write_atomic(&self.path, self.contents.as_bytes()).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })?;

        log::info!("{} in {}", self.summary, self.path.display());
        Ok(&self.path)
    }
}

/// Computes the new `AppSettings.xml` of `client_dir`.
pub fn app_settings_update(client_dir: &Path, domain: &str) -> Result<SettingsUpdate, SettingsError> {
    let path = client_dir.join(APP_SETTINGS_FILE);
    let url = base_url(domain);

    let contents = match read_optional(&path)? {
        Some(existing) => set_base_url(&existing, &url).map_err(|reason| SettingsError::Malformed {
            path: path.clone(),
            reason,
        })?,
        None => new_app_settings(&url),
    };

    Ok(SettingsUpdate {
        path,
        contents,
        summary: format!("Set BaseUrl to {url}"),
    })
}

/// Merges `flags` into a JSON flag map, overwriting flags of the same name.
/// `existing = None` starts from an empty map.
pub fn merge_flags(existing: Option<&str>, flags: &[(&str, &str)]) -> Result<String, MergeError> {
    let mut map = match existing {
        Some(text) if !text.trim().is_empty() => match serde_json::from_str(text)? {
            Value::Object(map) => map,
            _ => return Err(MergeError::NotAMap),
        },
        _ => Map::new(),
    };

    for (name, value) in flags {
        map.insert((*name).to_owned(), Value::String((*value).to_owned()));
    }

    let mut text = serde_json::to_string_pretty(&Value::Object(map))?;
    text.push('\n');
    Ok(text)
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("flag document is not a JSON object")]
    NotAMap,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Computes the new `ClientSettings/ClientAppSettings.json` of `client_dir`
/// with the cookie domain flag pointed at `domain`.
pub fn client_app_settings_update(
    client_dir: &Path,
    domain: &str,
) -> Result<SettingsUpdate, SettingsError> {
    let path = client_dir.join(CLIENT_SETTINGS_DIR).join(CLIENT_APP_SETTINGS_FILE);

    let existing = read_optional(&path)?;
    let contents = merge_flags(existing.as_deref(), &[(COOKIE_DOMAIN_FLAG, domain)]).map_err(|e| match e {
        MergeError::NotAMap => SettingsError::NotAFlagMap(path.clone()),
        MergeError::Json(source) => SettingsError::Json {
            path: path.clone(),
            source,
        },
    })?;

    Ok(SettingsUpdate {
        path,
        contents,
        summary: format!("Set {COOKIE_DOMAIN_FLAG} to {domain}"),
    })
}

fn read_optional(path: &Path) -> Result<Option<String>, SettingsError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SettingsError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}
