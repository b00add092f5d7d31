use super::{MAPS, TOKENS};
use crate::core::{Result, Value};
use crate::migration::context::StepContext;
use crate::migration::step::MigrationStep;
use crate::transaction::StepTransaction;
use tracing::{Level, event};

pub fn steps_30_to_31() -> Vec<MigrationStep> {
    vec![
        MigrationStep::new(30, "remove maps not owned by the local user")
            .with_transform(|tx, ctx| collect_foreign(tx, ctx, MAPS)),
        MigrationStep::new(31, "remove tokens not owned by the local user")
            .with_transform(|tx, ctx| collect_foreign(tx, ctx, TOKENS)),
    ]
}

/// Deletes every record of `table` whose `owner_field` is absent or not `local_user_id`.
/// Returns how many were deleted. `owner_field` must be the key or an index of `table`.
pub fn gc(
    tx: &mut StepTransaction,
    table: &str,
    owner_field: &str,
    local_user_id: &str,
) -> Result<usize> {
    tx.table_mut(table)?
        .delete_where_not_eq(owner_field, &Value::from(local_user_id))
}

fn collect_foreign(tx: &mut StepTransaction, ctx: &StepContext, table: &str) -> Result<()> {
    if tx.table(table)?.is_empty() {
        return Ok(());
    }
    let user_id = ctx.local_user_id(tx)?;
    let removed = gc(tx, table, "owner", &user_id)?;
    event!(
        Level::INFO,
        version = ctx.version(),
        table = %table,
        removed = removed,
        "removed records owned by other users"
    );
    Ok(())
}
