//! `Message` envelope: the unit the router moves between extensions, engines,
//! and remotes.
//!
//! Wire shape: reserved fields live under `_ten`, user properties sit
//! alongside at the top level. `to_wire`/`from_wire` do that
//! split; the in-memory `Message` keeps them already separated for cheaper
//! access from dispatch code.

pub mod conversion;
pub mod path_table;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use uuid::Uuid;

use crate::error::{Result, TenError};
use crate::location::Location;
use crate::value::Value;

pub const START_GRAPH: &str = "start_graph";
pub const STOP_GRAPH: &str = "stop_graph";
pub const CLOSE_APP: &str = "close_app";
pub const TIMER: &str = "timer";
pub const TIMEOUT: &str = "timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    Cmd,
    CmdResult,
    Data,
    AudioFrame,
    VideoFrame,
}

/// `cmd_result` status code. `Ok`/`Error` are the only statuses the dispatch
/// logic branches on; anything else is carried through as `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Ok,
    Error,
}

/// A message envelope. `properties` is the object-typed property bag;
/// user keys live here, never under `_ten`.
#[derive(Debug, Clone)]
pub struct Message {
    pub msg_type: MsgType,
    pub name: String,
    pub src: Location,
    pub dest: Vec<Location>,
    pub properties: Value,

    /// Present only for `Cmd`/`CmdResult`.
    pub cmd_id: Option<String>,
    /// The command-id this message's id was cloned from, if any.
    pub parent_cmd_id: Option<String>,

    /// `CmdResult` only.
    pub status: Option<StatusCode>,
    pub detail: Option<String>,
}

impl Message {
    pub fn new(msg_type: MsgType, name: impl Into<String>) -> Self {
        Self {
            msg_type,
            name: name.into(),
            src: Location::default(),
            dest: Vec::new(),
            properties: Value::object(),
            cmd_id: None,
            parent_cmd_id: None,
            status: None,
            detail: None,
        }
    }

    pub fn cmd(name: impl Into<String>) -> Self {
        Self::new(MsgType::Cmd, name)
    }

    pub fn data(name: impl Into<String>) -> Self {
        Self::new(MsgType::Data, name)
    }

    pub fn is_command_like(&self) -> bool {
        matches!(self.msg_type, MsgType::Cmd | MsgType::CmdResult)
    }

    /// Data-like messages (`data`/`audio_frame`/`video_frame`) are the only
    /// ones a bounded queue is allowed to drop under overflow.
    pub fn is_data_like(&self) -> bool {
        matches!(self.msg_type, MsgType::Data | MsgType::AudioFrame | MsgType::VideoFrame)
    }

    pub fn cmd_result(name: impl Into<String>, status: StatusCode) -> Self {
        let mut m = Self::new(MsgType::CmdResult, name);
        m.status = Some(status);
        m
    }

    pub fn ok_result(cmd_id: impl Into<String>, detail: impl Into<String>) -> Self {
        let mut m = Self::cmd_result("cmd_result", StatusCode::Ok);
        m.cmd_id = Some(cmd_id.into());
        m.detail = Some(detail.into());
        m
    }

    pub fn error_result(cmd_id: impl Into<String>, detail: impl Into<String>) -> Self {
        let mut m = Self::cmd_result("cmd_result", StatusCode::Error);
        m.cmd_id = Some(cmd_id.into());
        m.detail = Some(detail.into());
        m
    }

    /// Ensure a command has an id, generating one on first dispatch.
    pub fn ensure_cmd_id(&mut self) {
        if self.is_command_like() && self.cmd_id.is_none() {
            self.cmd_id = Some(Uuid::new_v4().to_string());
        }
    }

    /// Clone this message for fan-out: the clone gets a fresh command-id and
    /// this message's id becomes its `parent_cmd_id`. Panics are avoided by
    /// falling back to a freshly generated id if `self` has none yet.
    pub fn clone_for_fanout(&self) -> Self {
        let mut clone = self.clone();
        let parent = self.cmd_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        clone.cmd_id = Some(Uuid::new_v4().to_string());
        clone.parent_cmd_id = Some(parent);
        clone
    }

    /// Stamp `src` with `loc`, unless a non-empty `app_uri` is already
    /// present (preserves original provenance across transits).
    pub fn set_src_to(&mut self, loc: Location) {
        if self.src.app_uri.is_empty() {
            self.src = loc;
        }
    }

    pub fn set_src_to_app(&mut self, app_uri: impl Into<String>) {
        if self.src.app_uri.is_empty() {
            self.src = Location::for_app(app_uri);
        }
    }

    pub fn set_src_to_extension(
        &mut self,
        app_uri: impl Into<String>,
        graph_id: impl Into<String>,
        group_name: impl Into<String>,
        extension_name: impl Into<String>,
    ) {
        if self.src.app_uri.is_empty() {
            self.src = Location::for_extension(app_uri, graph_id, group_name, extension_name);
        }
    }

    /// Replace the dest list atomically with a single location.
    pub fn clear_and_set_dest(&mut self, loc: Location) {
        self.dest = vec![loc];
    }

    pub fn clear_and_set_dests(&mut self, locs: Vec<Location>) {
        self.dest = locs;
    }

    /// The single remaining destination, as required at dispatch time.
    pub fn sole_dest(&self) -> Result<&Location> {
        match self.dest.as_slice() {
            [only] => Ok(only),
            [] => Err(TenError::invalid_argument("message has no destination")),
            _ => Err(TenError::invalid_argument(
                "message has more than one destination at dispatch time",
            )),
        }
    }

    pub fn to_wire(&self) -> Json {
        let mut ten = Map::new();
        ten.insert(
            "type".into(),
            Json::String(match self.msg_type {
                MsgType::Cmd => "cmd".into(),
                MsgType::CmdResult => "cmd_result".into(),
                MsgType::Data => "data".into(),
                MsgType::AudioFrame => "audio_frame".into(),
                MsgType::VideoFrame => "video_frame".into(),
            }),
        );
        ten.insert("name".into(), Json::String(self.name.clone()));
        ten.insert("src".into(), serde_json::to_value(&self.src).unwrap_or(Json::Null));
        ten.insert(
            "dest".into(),
            Json::Array(
                self.dest
                    .iter()
                    .map(|d| serde_json::to_value(d).unwrap_or(Json::Null))
                    .collect(),
            ),
        );
        if let Some(id) = &self.cmd_id {
            ten.insert("cmd_id".into(), Json::String(id.clone()));
        }
        if let Some(pid) = &self.parent_cmd_id {
            ten.insert("parent_cmd_id".into(), Json::String(pid.clone()));
        }
        if let Some(status) = self.status {
            ten.insert(
                "status".into(),
                Json::String(match status {
                    StatusCode::Ok => "ok".into(),
                    StatusCode::Error => "error".into(),
                }),
            );
        }
        if let Some(detail) = &self.detail {
            ten.insert("detail".into(), Json::String(detail.clone()));
        }

        let mut out = match self.properties.to_json() {
            Json::Object(m) => m,
            _ => Map::new(),
        };
        out.insert("_ten".into(), Json::Object(ten));
        Json::Object(out)
    }

    pub fn from_wire(mut json: Json) -> Result<Self> {
        let obj = json
            .as_object_mut()
            .ok_or_else(|| TenError::InvalidJson("message is not a JSON object".into()))?;
        let ten = obj
            .remove("_ten")
            .ok_or_else(|| TenError::InvalidJson("missing _ten envelope".into()))?;
        let ten = ten
            .as_object()
            .ok_or_else(|| TenError::InvalidJson("_ten is not an object".into()))?;

        let type_str = ten
            .get("type")
            .and_then(Json::as_str)
            .ok_or_else(|| TenError::InvalidJson("_ten.type missing".into()))?;
        let msg_type = match type_str {
            "cmd" => MsgType::Cmd,
            "cmd_result" => MsgType::CmdResult,
            "data" => MsgType::Data,
            "audio_frame" => MsgType::AudioFrame,
            "video_frame" => MsgType::VideoFrame,
            other => return Err(TenError::InvalidJson(format!("unknown message type '{other}'"))),
        };
        let name = ten
            .get("name")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string();

        let src = ten
            .get("src")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()?
            .unwrap_or_default();
        let dest = ten
            .get("dest")
            .and_then(Json::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|v| serde_json::from_value(v.clone()))
                    .collect::<std::result::Result<Vec<Location>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let cmd_id = ten.get("cmd_id").and_then(Json::as_str).map(str::to_string);
        let parent_cmd_id = ten.get("parent_cmd_id").and_then(Json::as_str).map(str::to_string);
        let status = ten.get("status").and_then(Json::as_str).map(|s| match s {
            "ok" => StatusCode::Ok,
            _ => StatusCode::Error,
        });
        let detail = ten.get("detail").and_then(Json::as_str).map(str::to_string);

        Ok(Self {
            msg_type,
            name,
            src,
            dest,
            properties: Value::from_json(&Json::Object(std::mem::take(obj))),
            cmd_id,
            parent_cmd_id,
            status,
            detail,
        })
    }
}
