//! Console command table.
//!
//! The parser and the `help` command read the same entries, so keywords,
//! parameter ranges and usage strings stay in sync.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Show,
    Stats,
    Fixed,
    Auto,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatTag {
    Legacy,
    Ht,
    Vht,
}

/// `key=value` parameters accepted by `fixed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKey {
    Rate,
    Long,
    Mcs,
    Nss,
    Bandwidth,
    ShortGi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub key: &'static str,
    pub tag: ParamKey,
    pub min: u8,
    pub max: u8,
}

impl ParamSpec {
    #[must_use]
    pub const fn accepts(&self, value: u8) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatSpec {
    pub name: &'static str,
    pub tag: FormatTag,
    /// Parameter every request of this format must carry.
    pub required: ParamKey,
    pub params: &'static [ParamSpec],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    /// The command's first argument is a station.
    pub takes_station: bool,
    pub usage: &'static str,
    pub summary: &'static str,
}

const RATE: ParamSpec = ParamSpec {
    key: "rate",
    tag: ParamKey::Rate,
    min: 0,
    max: 11,
};

const LONG: ParamSpec = ParamSpec {
    key: "long",
    tag: ParamKey::Long,
    min: 0,
    max: 1,
};

const SGI: ParamSpec = ParamSpec {
    key: "sgi",
    tag: ParamKey::ShortGi,
    min: 0,
    max: 1,
};

const LEGACY_PARAMS: [ParamSpec; 2] = [RATE, LONG];

const HT_PARAMS: [ParamSpec; 4] = [
    ParamSpec {
        key: "mcs",
        tag: ParamKey::Mcs,
        min: 0,
        max: 7,
    },
    ParamSpec {
        key: "nss",
        tag: ParamKey::Nss,
        min: 0,
        max: 3,
    },
    ParamSpec {
        key: "bw",
        tag: ParamKey::Bandwidth,
        min: 20,
        max: 40,
    },
    SGI,
];

const VHT_PARAMS: [ParamSpec; 4] = [
    ParamSpec {
        key: "mcs",
        tag: ParamKey::Mcs,
        min: 0,
        max: 9,
    },
    ParamSpec {
        key: "nss",
        tag: ParamKey::Nss,
        min: 0,
        max: 7,
    },
    ParamSpec {
        key: "bw",
        tag: ParamKey::Bandwidth,
        min: 20,
        max: 160,
    },
    SGI,
];

const FORMATS: [FormatSpec; 3] = [
    FormatSpec {
        name: "legacy",
        tag: FormatTag::Legacy,
        required: ParamKey::Rate,
        params: &LEGACY_PARAMS,
    },
    FormatSpec {
        name: "ht",
        tag: FormatTag::Ht,
        required: ParamKey::Mcs,
        params: &HT_PARAMS,
    },
    FormatSpec {
        name: "vht",
        tag: FormatTag::Vht,
        required: ParamKey::Mcs,
        params: &VHT_PARAMS,
    },
];

const COMMANDS: [CommandSpec; 5] = [
    CommandSpec {
        name: "show",
        tag: CommandTag::Show,
        takes_station: false,
        usage: "show",
        summary: "one line per associated station",
    },
    CommandSpec {
        name: "stats",
        tag: CommandTag::Stats,
        takes_station: true,
        usage: "stats <sta>",
        summary: "sample table and retry chain of a station",
    },
    CommandSpec {
        name: "fixed",
        tag: CommandTag::Fixed,
        takes_station: true,
        usage: "fixed <sta> legacy rate=<0-11> [long=<0|1>] | \
                ht mcs=<0-7> [nss=<n>] [bw=<20|40>] [sgi=<0|1>] | \
                vht mcs=<0-9> [nss=<n>] [bw=<20|40|80|160>] [sgi=<0|1>]",
        summary: "force every retry step onto one rate",
    },
    CommandSpec {
        name: "auto",
        tag: CommandTag::Auto,
        takes_station: true,
        usage: "auto <sta>",
        summary: "return to automatic rate selection",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        takes_station: false,
        usage: "help [command]",
        summary: "list commands or describe one",
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Looks up a command by its tag.
#[must_use]
pub const fn command(tag: CommandTag) -> &'static CommandSpec {
    match tag {
        CommandTag::Show => &COMMANDS[0],
        CommandTag::Stats => &COMMANDS[1],
        CommandTag::Fixed => &COMMANDS[2],
        CommandTag::Auto => &COMMANDS[3],
        CommandTag::Help => &COMMANDS[4],
    }
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

/// Finds a `fixed` format by name (case insensitive).
#[must_use]
pub fn find_format(name: &str) -> Option<&'static FormatSpec> {
    FORMATS
        .iter()
        .find(|format| format.name.eq_ignore_ascii_case(name))
}

/// Finds a parameter of `format` by key (case insensitive).
#[must_use]
pub fn find_param(format: &FormatSpec, key: &str) -> Option<&'static ParamSpec> {
    format
        .params
        .iter()
        .find(|param| param.key.eq_ignore_ascii_case(key))
}
