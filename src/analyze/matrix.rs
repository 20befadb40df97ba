//! The (operation × version × shape) DDL feature matrix.
//!
//! Encodes how InnoDB applies each alteration: the algorithm tier, the
//! lock held, and whether the table is rebuilt. The match is exhaustive
//! over the operation enum on purpose, so adding an operation variant
//! fails compilation here until the matrix covers it.

use crate::classify::{NullabilityChange, OperationType, SubOperation};
use crate::db::ServerVersion;

use super::{Algorithm, DdlClass, LockLevel};

/// Classifies one DDL operation against the server version.
///
/// `old_type` is the current column type when the operation changes a
/// column, used to tell a pure rename from a type change.
pub fn classify_ddl(
    operation: OperationType,
    sub: Option<&SubOperation>,
    old_type: Option<&str>,
    version: &ServerVersion,
) -> DdlClass {
    use Algorithm::*;
    use LockLevel::*;
    use OperationType as Op;

    let class = match operation {
        Op::AddColumn => classify_add_column(sub, version),
        Op::DropColumn => {
            if version.supports_instant_anywhere() {
                DdlClass::new(Instant, None, false)
            } else {
                // Dropping a column rewrites every row in place.
                DdlClass::new(Inplace, None, true)
            }
        }
        Op::ModifyColumn | Op::ChangeColumn => classify_column_change(sub, old_type, version),
        Op::RenameColumn => DdlClass::new(Inplace, None, false),
        Op::SetDefault | Op::DropDefault => {
            if version.supports_instant_add() {
                DdlClass::new(Instant, None, false)
            } else {
                DdlClass::new(Inplace, None, false)
            }
        }
        // Online index build: the table is read-write while the index is
        // built to the side.
        Op::AddIndex => DdlClass::new(Inplace, None, false),
        Op::DropIndex => DdlClass::new(Inplace, None, false),
        Op::RenameIndex => DdlClass::new(Inplace, None, false),
        Op::ChangeIndexType => DdlClass::new(Inplace, None, false),
        // The first FULLTEXT index may add a hidden FTS_DOC_ID column and
        // concurrent DML is not permitted during the build.
        Op::AddFulltextIndex => DdlClass::new(Inplace, Shared, false),
        Op::AddSpatialIndex => DdlClass::new(Inplace, Shared, false),
        Op::AddPrimaryKey => DdlClass::new(Inplace, None, true),
        Op::DropPrimaryKey => DdlClass::new(Copy, Exclusive, true),
        Op::ReplacePrimaryKey => DdlClass::new(Copy, Exclusive, true),
        Op::AddForeignKey => DdlClass::new(Inplace, None, false),
        Op::DropForeignKey => DdlClass::new(Inplace, None, false),
        Op::AddCheck | Op::DropCheck => DdlClass::new(Inplace, None, false),
        Op::RenameTable => {
            if version.at_least(8, 0, 0) {
                DdlClass::new(Instant, None, false)
            } else {
                DdlClass::new(Inplace, None, false)
            }
        }
        // Full-table rewrites.
        Op::ChangeEngine => DdlClass::new(Copy, Exclusive, true),
        Op::ConvertCharset => DdlClass::new(Copy, Exclusive, true),
        Op::TableEncryption => DdlClass::new(Copy, Exclusive, true),
        // Metadata-only table options.
        Op::ChangeCharset => DdlClass::new(Inplace, None, false),
        Op::ChangeAutoIncrement => DdlClass::new(Inplace, None, false),
        Op::StatsOption => DdlClass::new(Inplace, None, false),
        // Rebuilding table options.
        Op::ChangeRowFormat => DdlClass::new(Inplace, None, true),
        Op::KeyBlockSize => DdlClass::new(Inplace, None, true),
        Op::ForceRebuild => DdlClass::new(Inplace, None, true),
        Op::OptimizeTable => DdlClass::new(Inplace, None, true),
        Op::AlterTablespace => DdlClass::new(Inplace, None, false),
        // Partition maintenance. Drop and truncate discard data quickly;
        // reorganize moves rows between partitions.
        Op::AddPartition => DdlClass::new(Inplace, None, false),
        Op::DropPartition => DdlClass::new(Inplace, None, false),
        Op::TruncatePartition => DdlClass::new(Inplace, None, false),
        Op::ReorganizePartition => DdlClass::new(Inplace, Shared, true),
        Op::RebuildPartition => DdlClass::new(Inplace, None, true),
        // Folded per sub-operation by the engine; the statement-level tag
        // alone says nothing.
        Op::MultipleOps => DdlClass::new(Instant, None, false),
        // Handled before matrix lookup (refusals and non-DDL kinds).
        Op::CreateTable | Op::Update | Op::Delete | Op::Insert | Op::LoadData => {
            DdlClass::new(Instant, None, false)
        }
        Op::Other => DdlClass::new(Instant, None, false),
    };

    degrade_for_old_servers(class, version)
}

/// ADD COLUMN: instant at the right versions, in-place rebuild otherwise.
fn classify_add_column(sub: Option<&SubOperation>, version: &ServerVersion) -> DdlClass {
    use Algorithm::*;
    use LockLevel::None as LockNone;

    let positioned = sub.is_some_and(|s| s.has_position_hint);
    let auto_increment = sub.is_some_and(|s| s.is_auto_increment);
    let stored_generated = sub.is_some_and(|s| s.is_stored_generated);

    // A stored generated column must be materialized for every row.
    if stored_generated {
        return DdlClass::new(Copy, LockLevel::Shared, true);
    }
    // Adding an auto-increment column rebuilds and blocks concurrent DML.
    if auto_increment {
        return DdlClass::new(Inplace, LockLevel::Shared, true);
    }
    if version.supports_instant_anywhere()
        || (version.supports_instant_add() && !positioned)
    {
        return DdlClass::new(Instant, LockNone, false);
    }
    DdlClass::new(Inplace, LockNone, true)
}

/// MODIFY / CHANGE COLUMN: a pure rename is metadata-only; anything that
/// changes the type copies the table; nullability-only changes rebuild in
/// place.
fn classify_column_change(
    sub: Option<&SubOperation>,
    old_type: Option<&str>,
    version: &ServerVersion,
) -> DdlClass {
    use Algorithm::*;

    let new_type = sub.and_then(|s| s.new_type.as_deref());
    let same_type = match (old_type, new_type) {
        (Some(old), Some(new)) => old.eq_ignore_ascii_case(new),
        // Without the current definition, assume the worst.
        _ => false,
    };

    if same_type {
        let nullability = sub.map(|s| s.nullability).unwrap_or_default();
        return match nullability {
            // Rename or attribute-only change at the same type.
            NullabilityChange::Unspecified => DdlClass::new(Inplace, LockLevel::None, false),
            // NULL <-> NOT NULL rewrites rows but stays in place.
            NullabilityChange::ToNullable | NullabilityChange::ToNotNull => {
                DdlClass::new(Inplace, LockLevel::None, true)
            }
        };
    }

    // VARCHAR growth within the same length-byte bucket is in-place from
    // 5.7 on; detecting the bucket needs both sides, so only claim it
    // when both types are varchar and the new one is longer.
    if let (Some(old), Some(new)) = (old_type, new_type) {
        if version.at_least(5, 7, 0) && is_varchar_widening(old, new) {
            return DdlClass::new(Inplace, LockLevel::None, false);
        }
    }

    DdlClass::new(Copy, LockLevel::Shared, true)
}

/// True when both types are varchar and the change only grows the length
/// without crossing the 255-byte length-prefix boundary.
fn is_varchar_widening(old: &str, new: &str) -> bool {
    let (Some(old_len), Some(new_len)) = (varchar_length(old), varchar_length(new)) else {
        return false;
    };
    new_len >= old_len && (old_len > 255) == (new_len > 255)
}

fn varchar_length(type_str: &str) -> Option<u32> {
    let rest = type_str.trim().strip_prefix("varchar(")?;
    rest.strip_suffix(')')?.parse().ok()
}

/// Servers without online DDL copy the table for anything beyond pure
/// metadata.
fn degrade_for_old_servers(class: DdlClass, version: &ServerVersion) -> DdlClass {
    if !version.predates_online_ddl() {
        return class;
    }
    match class.algorithm {
        Algorithm::Instant if !class.rebuilds_table => class,
        _ => DdlClass::new(
            Algorithm::Copy,
            class.lock.max(LockLevel::Shared),
            class.rebuilds_table || class.algorithm != Algorithm::Instant,
        ),
    }
}
