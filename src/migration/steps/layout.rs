use super::{MAPS, STATES, shape_error};
use crate::core::{Result, Value};
use crate::migration::context::StepContext;
use crate::migration::step::MigrationStep;
use crate::transaction::StepTransaction;
use std::collections::BTreeMap;
use tracing::{Level, event};

pub fn step_13() -> MigrationStep {
    MigrationStep::new(13, "add map groups and structured grid").with_transform(structure_map_grid)
}

pub fn step_17() -> MigrationStep {
    MigrationStep::new(17, "trim fog edit shapes to id and visibility")
        .with_transform(trim_fog_edit_shapes)
}

pub fn step_18() -> MigrationStep {
    MigrationStep::new(18, "fold draw and fog actions into shapes")
        .with_transform(fold_actions_into_shapes)
}

pub fn step_22() -> MigrationStep {
    MigrationStep::new(22, "shorten fog shape ids").with_transform(shorten_fog_shape_ids)
}

fn point(x: f64, y: f64) -> Value {
    let mut map = BTreeMap::new();
    map.insert("x".to_string(), Value::Float(x));
    map.insert("y".to_string(), Value::Float(y));
    Value::Map(map)
}

/// Inset of a square grid stretched over the whole map. The grid spans the full width; its
/// height follows from square cells.
pub fn grid_default_inset(grid_x: f64, grid_y: f64, map_width: f64, map_height: f64) -> Value {
    let bottom = (map_width * grid_y) / (grid_x * map_height);
    let bottom_right = if bottom.is_finite() && bottom > 0.0 {
        point(1.0, bottom)
    } else {
        point(1.0, 1.0)
    };
    let mut inset = BTreeMap::new();
    inset.insert("topLeft".to_string(), point(0.0, 0.0));
    inset.insert("bottomRight".to_string(), bottom_right);
    Value::Map(inset)
}

fn structure_map_grid(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    tx.table_mut(MAPS)?.modify_all(|_, map| {
        let number = |field: &str| map.get_f64(field).unwrap_or(0.0);
        let (grid_x, grid_y) = (number("gridX"), number("gridY"));
        let inset = grid_default_inset(grid_x, grid_y, number("width"), number("height"));

        let mut size = BTreeMap::new();
        size.insert("x".to_string(), map.get("gridX").cloned().unwrap_or_default());
        size.insert("y".to_string(), map.get("gridY").cloned().unwrap_or_default());
        let mut grid = BTreeMap::new();
        grid.insert("size".to_string(), Value::Map(size));
        grid.insert("inset".to_string(), inset);
        grid.insert("type".to_string(), Value::from("square"));

        map.set("group", "");
        map.set("grid", grid);
        map.remove("gridX");
        map.remove("gridY");
        map.remove("gridType");
        Ok(())
    })?;
    Ok(())
}

fn trim_fog_edit_shapes(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    tx.table_mut(STATES)?.modify_all(|_, state| {
        let Some(actions) = state.get_list_mut("fogDrawActions") else {
            return Ok(());
        };
        for action in actions.iter_mut() {
            if action.get("type").and_then(Value::as_str) != Some("edit") {
                continue;
            }
            let Some(shapes) = action
                .as_map_mut()
                .and_then(|action| action.get_mut("shapes"))
                .and_then(Value::as_list_mut)
            else {
                continue;
            };
            for shape in shapes.iter_mut() {
                let mut trimmed = BTreeMap::new();
                for field in ["id", "visible"] {
                    if let Some(value) = shape.get(field) {
                        trimmed.insert(field.to_string(), value.clone());
                    }
                }
                *shape = Value::Map(trimmed);
            }
        }
        Ok(())
    })?;
    Ok(())
}

fn shape_id(shape: &Value) -> Result<String> {
    shape
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| shape_error("action shape has no id"))
}

/// Replays actions `0..=index` into a map of shapes keyed by id. A negative index means no
/// action was applied. Null entries and unknown action types are skipped.
///
/// A `subtract` action adds each subtracting shape's points as a hole on every shape
/// present at that point, without any intersection test.
pub fn convert_old_actions_to_shapes(actions: &[Value], index: i64) -> Result<BTreeMap<String, Value>> {
    let mut shapes: BTreeMap<String, Value> = BTreeMap::new();
    if index < 0 {
        return Ok(shapes);
    }
    let applied = actions.iter().take(index as usize + 1);

    for action in applied {
        let Some(kind) = action.get("type").and_then(Value::as_str) else {
            event!(Level::DEBUG, action = %action, "skipping action without a type");
            continue;
        };
        let action_shapes = action.get("shapes").and_then(Value::as_list);
        match kind {
            "add" => {
                for shape in action_shapes.into_iter().flatten() {
                    shapes.insert(shape_id(shape)?, shape.clone());
                }
            }
            "edit" => {
                for edit in action_shapes.into_iter().flatten() {
                    let id = shape_id(edit)?;
                    let (Some(existing), Some(changes)) =
                        (shapes.get_mut(&id).and_then(Value::as_map_mut), edit.as_map())
                    else {
                        continue;
                    };
                    for (field, value) in changes {
                        existing.insert(field.clone(), value.clone());
                    }
                }
            }
            "remove" => {
                let ids = action.get("shapeIds").and_then(Value::as_list);
                for id in ids.into_iter().flatten().filter_map(Value::as_str) {
                    shapes.remove(id);
                }
            }
            "subtract" => {
                let holes: Vec<Value> = action_shapes
                    .into_iter()
                    .flatten()
                    .filter_map(|shape| shape.get("data").and_then(|data| data.get("points")))
                    .cloned()
                    .collect();
                for shape in shapes.values_mut() {
                    let Some(data) = shape
                        .as_map_mut()
                        .and_then(|shape| shape.get_mut("data"))
                        .and_then(Value::as_map_mut)
                    else {
                        continue;
                    };
                    let existing = data
                        .entry("holes".to_string())
                        .or_insert_with(|| Value::List(Vec::new()));
                    if let Some(list) = existing.as_list_mut() {
                        list.extend(holes.iter().cloned());
                    }
                }
            }
            other => {
                event!(Level::DEBUG, kind = %other, "skipping unknown action type");
            }
        }
    }
    Ok(shapes)
}

fn fold_actions_into_shapes(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    tx.table_mut(STATES)?.modify_all(|_, state| {
        if let Some(notes) = state.get_map_mut("notes") {
            for note in notes.values_mut() {
                if let Some(note) = note.as_map_mut() {
                    note.insert("textOnly".to_string(), Value::Boolean(false));
                }
            }
        }

        for (actions_field, index_field, shapes_field) in [
            ("mapDrawActions", "mapDrawActionIndex", "drawShapes"),
            ("fogDrawActions", "fogDrawActionIndex", "fogShapes"),
        ] {
            let actions = match state.remove(actions_field) {
                Some(Value::List(actions)) => actions,
                _ => Vec::new(),
            };
            let index = state
                .remove(index_field)
                .and_then(|index| index.as_i64())
                .unwrap_or(-1);
            let shapes = convert_old_actions_to_shapes(&actions, index)?;
            state.set(shapes_field, shapes);
        }
        Ok(())
    })?;
    Ok(())
}

fn shorten_fog_shape_ids(tx: &mut StepTransaction, ctx: &StepContext) -> Result<()> {
    tx.table_mut(STATES)?.modify_all(|_, state| {
        let Some(shapes) = state.get_map_mut("fogShapes") else {
            return Ok(());
        };
        let old = std::mem::take(shapes);
        for (_, mut shape) in old {
            let id = ctx.new_short_id();
            if let Some(fields) = shape.as_map_mut() {
                fields.insert("id".to_string(), Value::from(id.as_str()));
            }
            shapes.insert(id, shape);
        }
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn actions(json: serde_json::Value) -> Vec<Value> {
        match Value::from_json(json) {
            Value::List(items) => items,
            _ => unreachable!(),
        }
    }

    #[test]
    fn inset_follows_grid_aspect() {
        let inset = grid_default_inset(10.0, 5.0, 1000.0, 1000.0);
        assert_eq!(
            inset.get("bottomRight").and_then(|p| p.get("y")).and_then(Value::as_f64),
            Some(0.5)
        );
        assert_eq!(
            inset.get("topLeft").and_then(|p| p.get("x")).and_then(Value::as_f64),
            Some(0.0)
        );
    }

    #[test]
    fn degenerate_inset_falls_back_to_unit() {
        let inset = grid_default_inset(0.0, 5.0, 100.0, 100.0);
        assert_eq!(
            inset.get("bottomRight").and_then(|p| p.get("y")).and_then(Value::as_f64),
            Some(1.0)
        );
        let inset = grid_default_inset(10.0, 10.0, 100.0, 0.0);
        assert_eq!(
            inset.get("bottomRight").and_then(|p| p.get("y")).and_then(Value::as_f64),
            Some(1.0)
        );
    }

    #[test]
    fn folds_add_edit_remove_up_to_index() {
        let list = actions(json!([
            {"type": "add", "shapes": [
                {"id": "a", "color": "red", "data": {"points": [1]}},
                {"id": "b", "color": "blue", "data": {"points": [2]}}
            ]},
            {"type": "edit", "shapes": [{"id": "a", "color": "green"}]},
            {"type": "remove", "shapeIds": ["b"]},
            {"type": "add", "shapes": [{"id": "c", "data": {"points": []}}]}
        ]));

        let shapes = convert_old_actions_to_shapes(&list, 2).unwrap();
        assert_eq!(shapes.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(shapes["a"].get("color").and_then(Value::as_str), Some("green"));

        assert!(convert_old_actions_to_shapes(&list, -1).unwrap().is_empty());
        assert_eq!(convert_old_actions_to_shapes(&list, 10).unwrap().len(), 2);
    }

    #[test]
    fn subtract_adds_holes_to_existing_shapes() {
        let list = actions(json!([
            {"type": "add", "shapes": [{"id": "a", "data": {"points": [1], "holes": []}}]},
            {"type": "subtract", "shapes": [{"id": "x", "data": {"points": [9, 9]}}]}
        ]));
        let shapes = convert_old_actions_to_shapes(&list, 1).unwrap();
        let holes = shapes["a"]
            .get("data")
            .and_then(|data| data.get("holes"))
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(holes.len(), 1);
        assert!(!shapes.contains_key("x"));
    }

    #[test]
    fn null_and_unknown_actions_are_skipped() {
        let list = actions(json!([
            {"type": "add", "shapes": [{"id": "a", "data": {"points": [1]}}]},
            null,
            {"type": "resize", "shapes": [{"id": "a", "data": {"points": [5]}}]},
            {"shapes": []},
            {"type": "add", "shapes": [{"id": "b", "data": {"points": [2]}}]}
        ]));

        let shapes = convert_old_actions_to_shapes(&list, 1).unwrap();
        assert_eq!(shapes.keys().collect::<Vec<_>>(), vec!["a"]);

        let shapes = convert_old_actions_to_shapes(&list, 4).unwrap();
        assert_eq!(shapes.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(
            shapes["a"]
                .get("data")
                .and_then(|data| data.get("points"))
                .and_then(Value::as_list)
                .map(Vec::len),
            Some(1)
        );
    }
}
