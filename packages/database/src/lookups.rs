//! The `country` and `sea` lookup tables.

use std::collections::{BTreeMap, BTreeSet};

use duckdb::Connection;
use quake_map_location_models::{Country, Sea, SeaId};

use crate::{DbError, in_transaction};

/// Upserts countries by ISO code. Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails; the batch is rolled back.
pub fn upsert_countries(conn: &Connection, countries: &[Country]) -> Result<u64, DbError> {
    if countries.is_empty() {
        return Ok(0);
    }

    in_transaction(conn, |conn| {
        let mut stmt = conn.prepare(
            "INSERT INTO country (iso, name) VALUES (?, ?)
             ON CONFLICT (iso) DO UPDATE SET name = EXCLUDED.name",
        )?;

        let mut total = 0u64;
        for country in countries {
            let rows = stmt.execute(duckdb::params![country.iso, country.name])?;
            total += u64::try_from(rows).unwrap_or(0);
        }
        Ok(total)
    })
}

/// Makes the `sea` table equal to `names`, where position `i` is id `i`.
///
/// Rows that already match are left untouched. Rows whose id or name no
/// longer fits the assignment are removed before the missing rows are
/// inserted, so renames and reorders never trip the unique name
/// constraint. Returns the number of seas in the assignment.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails, a name repeats, or there are
/// more names than ids. Repeated names are rejected before the table is
/// touched.
pub fn replace_seas(conn: &Connection, names: &[String]) -> Result<u64, DbError> {
    let mut seen = BTreeSet::new();
    if let Some(dup) = names.iter().find(|name| !seen.insert(name.as_str())) {
        return Err(DbError::Conversion {
            message: format!("sea name {dup:?} appears more than once"),
        });
    }

    let wanted: Vec<Sea> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            SeaId::try_from(i)
                .map(|id| Sea {
                    id,
                    name: name.clone(),
                })
                .map_err(|e| DbError::Conversion {
                    message: format!("sea index {i} out of range: {e}"),
                })
        })
        .collect::<Result<_, _>>()?;

    let existing: BTreeMap<SeaId, String> = load_seas(conn)?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();

    let stale: Vec<SeaId> = existing
        .iter()
        .filter(|(id, name)| {
            usize::try_from(**id)
                .ok()
                .and_then(|i| names.get(i))
                .is_none_or(|wanted_name| wanted_name != *name)
        })
        .map(|(id, _)| *id)
        .collect();

    let missing: Vec<&Sea> = wanted
        .iter()
        .filter(|s| existing.get(&s.id) != Some(&s.name))
        .collect();

    // Unique-index deletes and re-inserts of the same key are committed
    // separately; DuckDB rejects them inside one transaction. A failed
    // insert below therefore leaves the table short of the stale rows, and
    // the resolver reports it as not populated until the next replace.
    if !stale.is_empty() {
        let mut stmt = conn.prepare("DELETE FROM sea WHERE id = ?")?;
        for id in &stale {
            stmt.execute([*id])?;
        }
        log::info!("Removed {} outdated sea rows", stale.len());
    }

    if !missing.is_empty() {
        in_transaction(conn, |conn| {
            let mut stmt = conn.prepare("INSERT INTO sea (id, name) VALUES (?, ?)")?;
            for sea in &missing {
                stmt.execute(duckdb::params![sea.id, sea.name])?;
            }
            Ok(())
        })
        .inspect_err(|e| {
            log::error!(
                "Sea insert failed after removing {} rows; table is incomplete: {e}",
                stale.len()
            );
        })?;
        log::info!("Inserted {} sea rows", missing.len());
    }

    Ok(wanted.len() as u64)
}

/// Reads the `country` table ordered by ISO code.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn load_countries(conn: &Connection) -> Result<Vec<Country>, DbError> {
    let mut stmt = conn.prepare("SELECT iso, name FROM country ORDER BY iso")?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();

    while let Some(row) = rows.next()? {
        out.push(Country {
            iso: row.get(0)?,
            name: row.get(1)?,
        });
    }

    Ok(out)
}

/// Reads the `sea` table ordered by id.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn load_seas(conn: &Connection) -> Result<Vec<Sea>, DbError> {
    let mut stmt = conn.prepare("SELECT id, name FROM sea ORDER BY id")?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();

    while let Some(row) = rows.next()? {
        out.push(Sea {
            id: row.get(0)?,
            name: row.get(1)?,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn countries_upsert_by_iso() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();

        let rows = vec![
            Country {
                iso: "USA".to_string(),
                name: "United States".to_string(),
            },
            Country {
                iso: "CAN".to_string(),
                name: "Canada".to_string(),
            },
        ];
        assert_eq!(upsert_countries(conn, &rows).unwrap(), 2);
        assert_eq!(upsert_countries(conn, &rows).unwrap(), 2);

        let loaded = load_countries(conn).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].iso, "CAN");
        assert_eq!(upsert_countries(conn, &[]).unwrap(), 0);
    }

    #[test]
    fn seas_assignment_is_stable() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();

        let first = names(&["Arctic Ocean", "North Pacific Ocean", "South Pacific Ocean"]);
        assert_eq!(replace_seas(conn, &first).unwrap(), 3);
        assert_eq!(replace_seas(conn, &first).unwrap(), 3);

        let loaded = load_seas(conn).unwrap();
        assert_eq!(
            loaded
                .iter()
                .map(|s| (s.id, s.name.as_str()))
                .collect::<Vec<_>>(),
            vec![
                (0, "Arctic Ocean"),
                (1, "North Pacific Ocean"),
                (2, "South Pacific Ocean")
            ]
        );
    }

    #[test]
    fn seas_reorder_and_shrink() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();

        replace_seas(conn, &names(&["A", "B", "C"])).unwrap();
        replace_seas(conn, &names(&["B", "A"])).unwrap();

        let loaded = load_seas(conn).unwrap();
        assert_eq!(
            loaded,
            vec![
                Sea {
                    id: 0,
                    name: "B".to_string()
                },
                Sea {
                    id: 1,
                    name: "A".to_string()
                },
            ]
        );
    }

    #[test]
    fn repeated_sea_names_leave_table_untouched() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();

        replace_seas(conn, &names(&["A", "B", "C"])).unwrap();
        assert!(matches!(
            replace_seas(conn, &names(&["C", "A", "C"])),
            Err(DbError::Conversion { .. })
        ));

        let loaded = load_seas(conn).unwrap();
        assert_eq!(
            loaded.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );
    }
}
