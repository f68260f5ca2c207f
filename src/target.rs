/* The closed set of access points this controller guards, and the terminal
 * self-identification names used on the wire. */
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Gate,
    Upstairs,
    Elevator,
    Control,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Gate => "gate",
            Target::Upstairs => "upstairs",
            Target::Elevator => "elevator",
            Target::Control => "control",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownTarget;

impl fmt::Display for UnknownTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown target name")
    }
}

impl std::error::Error for UnknownTarget {}

impl FromStr for Target {
    type Err = UnknownTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gate" => Ok(Target::Gate),
            "upstairs" => Ok(Target::Upstairs),
            "elevator" => Ok(Target::Elevator),
            "control" => Ok(Target::Control),
            _ => Err(UnknownTarget),
        }
    }
}
