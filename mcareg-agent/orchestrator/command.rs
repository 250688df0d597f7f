use mcareg_raw::MemoryTarget;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Transaction performed by a command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Read,
    Write,
    ShortWrite,
    /// Read, merge `fields` then `user`, write back
    #[serde(alias = "update")]
    Rmw,
    /// Read, merge `fields`, never write
    FieldsToUser,
    /// Read, merge `user`, never write
    UserToFields,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Read => "read",
            Direction::Write => "write",
            Direction::ShortWrite => "short_write",
            Direction::Rmw => "rmw",
            Direction::FieldsToUser => "fields_to_user",
            Direction::UserToFields => "user_to_fields",
        }
    }
}

/// Serial numbers a command applies to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Targets {
    One(String),
    Many(Vec<String>),
}

impl Targets {
    /// Selected serials in order, or `None` for every device
    pub fn serials(&self) -> Option<&[String]> {
        match self {
            Targets::One(serial) if serial.is_empty() => None,
            Targets::One(serial) => Some(std::slice::from_ref(serial)),
            Targets::Many(serials) if serials.is_empty() => None,
            Targets::Many(serials) => Some(serials),
        }
    }
}

/// Data carried by a command
///
/// `registers` feeds write and short_write; `fields` and `user` are partial
/// updates for rmw and the sync directions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Payload {
    pub registers: Vec<f64>,
    #[serde(deserialize_with = "object_or_empty")]
    pub fields: Map<String, Value>,
    #[serde(deserialize_with = "object_or_empty")]
    pub user: Map<String, Value>,
}

// Older command files use `[]` for "no update"
fn object_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::Array(items) if items.is_empty() => Ok(Map::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected an object, got {other}"
        ))),
    }
}

fn default_name() -> String {
    "fpga_ctrl".to_string()
}

/// One request, as found in a command file
///
/// ```json
/// {"sn": ["eRC1234"], "dir": "rmw", "memory": "ram", "name": "fpga_ctrl",
///  "data": {"fields": {"led_on": 1}, "user": {"integration_time": 2e-6}}}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Command {
    /// Absent, `""` or `[]` selects every device
    #[serde(default)]
    pub sn: Option<Targets>,
    #[serde(default)]
    pub dir: Direction,
    #[serde(default, alias = "mem")]
    pub memory: MemoryTarget,
    #[serde(default = "default_name")]
    pub name: String,
    /// Words to transfer, 0 for the whole bank
    #[serde(default)]
    pub num_items: usize,
    /// Auxiliary control words for the command packet
    #[serde(default)]
    pub ctrl: Vec<i64>,
    #[serde(default)]
    pub data: Payload,
}

impl Command {
    pub fn new(dir: Direction, name: impl Into<String>) -> Self {
        Self {
            sn: None,
            dir,
            memory: MemoryTarget::default(),
            name: name.into(),
            num_items: 0,
            ctrl: Vec::new(),
            data: Payload::default(),
        }
    }

    pub fn read(name: impl Into<String>) -> Self {
        Self::new(Direction::Read, name)
    }

    pub fn write(name: impl Into<String>, registers: Vec<f64>) -> Self {
        Self::new(Direction::Write, name).with_registers(registers)
    }

    pub fn short_write(name: impl Into<String>, registers: Vec<f64>) -> Self {
        Self::new(Direction::ShortWrite, name).with_registers(registers)
    }

    pub fn rmw(name: impl Into<String>) -> Self {
        Self::new(Direction::Rmw, name)
    }

    pub fn with_serials<S: Into<String>>(mut self, serials: impl IntoIterator<Item = S>) -> Self {
        self.sn = Some(Targets::Many(serials.into_iter().map(Into::into).collect()));
        self
    }

    pub fn with_memory(mut self, memory: MemoryTarget) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_num_items(mut self, num_items: usize) -> Self {
        self.num_items = num_items;
        self
    }

    pub fn with_ctrl(mut self, ctrl: Vec<i64>) -> Self {
        self.ctrl = ctrl;
        self
    }

    pub fn with_registers(mut self, registers: Vec<f64>) -> Self {
        self.data.registers = registers;
        self
    }

    pub fn with_fields(mut self, fields: Map<String, Value>) -> Self {
        self.data.fields = fields;
        self
    }

    pub fn with_user(mut self, user: Map<String, Value>) -> Self {
        self.data.user = user;
        self
    }

    /// First `limit` control words, masked to 16 bits
    pub fn aux_words(&self, limit: usize) -> Vec<u16> {
        self.ctrl
            .iter()
            .take(limit)
            .map(|&word| (word & 0xFFFF) as u16)
            .collect()
    }
}
