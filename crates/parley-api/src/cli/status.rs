//! System status dashboard command.

use anyhow::Result;
use console::style;
use sqlx::Row;

use crate::state::AppState;

/// Display system status dashboard.
///
/// Shows session counts by status, message volume, tenant/API-key
/// counts, and version.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    // Gather stats straight from the database -- this is an operator
    // view across all tenants, not a tenant-scoped API.
    let session_rows = sqlx::query("SELECT status, COUNT(*) as cnt FROM sessions GROUP BY status")
        .fetch_all(&state.db_pool.reader)
        .await?;

    let mut total_sessions: i64 = 0;
    let mut waiting: i64 = 0;
    let mut active: i64 = 0;
    let mut closed: i64 = 0;
    for row in &session_rows {
        let status: String = row.get("status");
        let count: i64 = row.get("cnt");
        total_sessions += count;
        match status.as_str() {
            "waiting" => waiting = count,
            "active" => active = count,
            "closed" | "timeout" => closed += count,
            _ => {}
        }
    }

    let (total_messages,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
        .fetch_one(&state.db_pool.reader)
        .await?;
    let (api_keys,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys")
        .fetch_one(&state.db_pool.reader)
        .await?;
    let (tenants,): (i64,) = sqlx::query_as("SELECT COUNT(DISTINCT tenant_id) FROM api_keys")
        .fetch_one(&state.db_pool.reader)
        .await?;

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "tenants": tenants,
            "api_keys": api_keys,
            "sessions": {
                "total": total_sessions,
                "waiting": waiting,
                "active": active,
                "closed": closed,
            },
            "messages": total_messages,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Parley v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Sessions ──").dim());
    println!("  Total:   {}", style(total_sessions).bold());
    println!("  Waiting: {}", style(waiting).yellow());
    println!("  Active:  {}", style(active).green());
    if closed > 0 {
        println!("  Closed:  {}", style(closed).dim());
    }
    println!();

    println!("  {}", style("── Messages ──").dim());
    println!("  Stored: {}", style(total_messages).bold());
    println!();

    println!("  {}", style("── Tenants ──").dim());
    println!("  Tenants:  {}", style(tenants).bold());
    println!("  API keys: {}", api_keys);
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!("  Database: {}", style("SQLite (WAL mode)").dim());
    println!();

    Ok(())
}
