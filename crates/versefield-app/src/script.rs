//! Scripted host input, one action per line: `TICK:click:X,Y` with the
//! pointer in normalized device coordinates, or `TICK:control:NAME[=VALUE]`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use versefield_core::{Payload, Vec2};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("expected `TICK:click:X,Y` or `TICK:control:NAME[=VALUE]`, got `{0}`")]
    Malformed(String),
    #[error("invalid tick `{0}`")]
    Tick(String),
    #[error("invalid pointer coordinates `{0}`")]
    Pointer(String),
    #[error("unknown action kind `{0}`")]
    Kind(String),
    #[error("control value `{0}` is neither a flag nor a number")]
    Value(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptAction {
    Click(Vec2),
    Control { name: String, payload: Payload },
}

/// Input applied before the given tick is stepped.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedInput {
    pub tick: u64,
    pub action: ScriptAction,
}

impl FromStr for ScriptedInput {
    type Err = ScriptError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let text = raw.trim();
        let mut parts = text.splitn(3, ':');
        let (Some(tick), Some(kind), Some(rest)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ScriptError::Malformed(text.to_owned()));
        };
        let tick = tick
            .trim()
            .parse::<u64>()
            .map_err(|_| ScriptError::Tick(tick.to_owned()))?;
        let action = match kind.trim() {
            "click" => ScriptAction::Click(parse_pointer(rest)?),
            "control" => {
                let (name, value) = match rest.split_once('=') {
                    Some((name, value)) => (name, Some(value)),
                    None => (rest, None),
                };
                let name = name.trim();
                if name.is_empty() {
                    return Err(ScriptError::Malformed(text.to_owned()));
                }
                ScriptAction::Control {
                    name: name.to_owned(),
                    payload: value.map_or(Ok(Payload::None), parse_payload)?,
                }
            }
            other => return Err(ScriptError::Kind(other.to_owned())),
        };
        Ok(Self { tick, action })
    }
}

fn parse_pointer(raw: &str) -> Result<Vec2, ScriptError> {
    let err = || ScriptError::Pointer(raw.to_owned());
    let (x, y) = raw.split_once(',').ok_or_else(err)?;
    let x = x.trim().parse::<f32>().map_err(|_| err())?;
    let y = y.trim().parse::<f32>().map_err(|_| err())?;
    if !x.is_finite() || !y.is_finite() {
        return Err(err());
    }
    Ok(Vec2::new(x, y))
}

fn parse_payload(raw: &str) -> Result<Payload, ScriptError> {
    let raw = raw.trim();
    match raw {
        "true" | "on" => Ok(Payload::Flag(true)),
        "false" | "off" => Ok(Payload::Flag(false)),
        _ => raw
            .parse::<f32>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Payload::Scalar)
            .ok_or_else(|| ScriptError::Value(raw.to_owned())),
    }
}

impl fmt::Display for ScriptedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            ScriptAction::Click(ndc) => write!(f, "{}:click:{},{}", self.tick, ndc.x, ndc.y),
            ScriptAction::Control { name, payload } => {
                write!(f, "{}:control:{name}", self.tick)?;
                match payload {
                    Payload::None => Ok(()),
                    Payload::Flag(flag) => write!(f, "={flag}"),
                    Payload::Scalar(value) => write!(f, "={value}"),
                }
            }
        }
    }
}

/// Parse a whole script, skipping blank lines and `#` comments.
pub fn parse_script(text: &str) -> Result<Vec<ScriptedInput>, (usize, ScriptError)> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| line.parse().map_err(|err| (index + 1, err)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clicks_and_controls() {
        let click: ScriptedInput = "12:click:0.25,-0.5".parse().unwrap();
        assert_eq!(click.tick, 12);
        assert_eq!(click.action, ScriptAction::Click(Vec2::new(0.25, -0.5)));

        let gain: ScriptedInput = "3:control:speed=1.5".parse().unwrap();
        assert_eq!(
            gain.action,
            ScriptAction::Control {
                name: "speed".to_owned(),
                payload: Payload::Scalar(1.5),
            }
        );

        let select: ScriptedInput = "0:control:particle-view=true".parse().unwrap();
        assert_eq!(
            select.action,
            ScriptAction::Control {
                name: "particle-view".to_owned(),
                payload: Payload::Flag(true),
            }
        );

        let reset: ScriptedInput = "7:control:reset".parse().unwrap();
        assert_eq!(reset.to_string(), "7:control:reset");
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(matches!(
            "x:click:0,0".parse::<ScriptedInput>(),
            Err(ScriptError::Tick(_))
        ));
        assert!(matches!(
            "1:click:0".parse::<ScriptedInput>(),
            Err(ScriptError::Pointer(_))
        ));
        assert!(matches!(
            "1:hover:0,0".parse::<ScriptedInput>(),
            Err(ScriptError::Kind(_))
        ));
        assert!(matches!(
            "1:control:speed=fast".parse::<ScriptedInput>(),
            Err(ScriptError::Value(_))
        ));
        assert!(matches!(
            "1:control".parse::<ScriptedInput>(),
            Err(ScriptError::Malformed(_))
        ));
    }

    #[test]
    fn script_reports_line_numbers() {
        let script = "# warm up\n1:click:0,0\n\n4:control:reset\n";
        assert_eq!(parse_script(script).unwrap().len(), 2);
        let err = parse_script("1:click:0,0\nbogus").unwrap_err();
        assert_eq!(err.0, 2);
    }
}
