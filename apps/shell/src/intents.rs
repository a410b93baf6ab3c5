use anyhow::{anyhow, bail, Context, Result};
use shared::domain::{BlendMode, LayerId};
use shared::protocol::PanelIntent;

fn layer_id(raw: Option<&str>) -> Result<LayerId> {
    let raw = raw.context("missing layer id")?;
    LayerId::parse(raw).ok_or_else(|| anyhow!("'{raw}' is not a layer id (expected L<n>)"))
}

/// Parses a panel command such as `hide L1`, `opacity L0 0.5` or
/// `order L2,L0,L1` (top-most first, as the panel lists them).
pub fn parse_intent(command: &str) -> Result<PanelIntent> {
    let mut words = command.split_whitespace();
    let verb = words.next().context("empty command")?;
    let intent = match verb {
        "show" => PanelIntent::SetVisible {
            id: layer_id(words.next())?,
            visible: true,
        },
        "hide" => PanelIntent::SetVisible {
            id: layer_id(words.next())?,
            visible: false,
        },
        "opacity" => {
            let id = layer_id(words.next())?;
            let raw = words.next().context("missing opacity value")?;
            let opacity = raw
                .parse()
                .with_context(|| format!("'{raw}' is not a number"))?;
            PanelIntent::SetOpacity { id, opacity }
        }
        "blend" => {
            let id = layer_id(words.next())?;
            match words.next() {
                None => PanelIntent::ToggleBlendMode { id },
                Some("normal") => PanelIntent::SetBlendMode {
                    id,
                    blend_mode: BlendMode::Normal,
                },
                Some("multiply") => PanelIntent::SetBlendMode {
                    id,
                    blend_mode: BlendMode::Multiply,
                },
                Some(other) => bail!("unknown blend mode '{other}'"),
            }
        }
        "order" => {
            let list = words.next().context("missing layer list")?;
            let top_first = list
                .split(',')
                .map(|raw| layer_id(Some(raw.trim())))
                .collect::<Result<Vec<_>>>()?;
            PanelIntent::Reorder { top_first }
        }
        "remove" => PanelIntent::Remove {
            id: layer_id(words.next())?,
        },
        other => bail!("unknown command '{other}'"),
    };
    if let Some(extra) = words.next() {
        bail!("unexpected argument '{extra}' in '{command}'");
    }
    Ok(intent)
}

#[cfg(test)]
#[path = "tests/intents_tests.rs"]
mod tests;
