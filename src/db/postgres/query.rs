use tokio_postgres::types::ToSql;

use crate::web::DelegationsCriteria;

const BASE_DELEGATIONS_QUERY: &str =
    "SELECT id, timestamp, amount::TEXT AS amount, delegator, level FROM delegations";

/// Bound query parameter. Kept typed so each one matches its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryArg {
    Int(i32),
    BigInt(i64),
}

impl QueryArg {
    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            QueryArg::Int(v) => v,
            QueryArg::BigInt(v) => v,
        }
    }
}

/// Builds the paged delegations read, numbering placeholders as it goes.
#[derive(Debug, Clone)]
pub struct DelegationsQuery {
    sql: String,
    args: Vec<QueryArg>,
}

impl Default for DelegationsQuery {
    fn default() -> Self {
        Self {
            sql: BASE_DELEGATIONS_QUERY.to_string(),
            args: Vec::new(),
        }
    }
}

impl DelegationsQuery {
    pub fn for_criteria(criteria: &DelegationsCriteria) -> Self {
        let mut query = Self::default();

        if let Some(year) = criteria.year {
            query.push_where("year = ", QueryArg::Int(year));
        }

        // Newest first; id breaks ties between operations in the same block
        query.sql.push_str(" ORDER BY timestamp DESC, id DESC");

        // One extra row tells whether a next page exists
        let limit = criteria.per_page.saturating_add(1);
        query.push_clause(" LIMIT ", QueryArg::BigInt(clamp_to_bigint(limit)));

        // Pages past the end of BIGINT simply come back empty
        let offset = criteria.items_to_skip();
        if offset > 0 {
            query.push_clause(" OFFSET ", QueryArg::BigInt(clamp_to_bigint(offset)));
        }

        query
    }

    pub fn build(&self) -> (&str, Vec<&(dyn ToSql + Sync)>) {
        (&self.sql, self.args.iter().map(QueryArg::as_sql).collect())
    }

    fn push_where(&mut self, condition: &str, arg: QueryArg) {
        let keyword = if self.sql.contains(" WHERE ") {
            " AND "
        } else {
            " WHERE "
        };
        self.sql.push_str(keyword);
        self.push_clause(condition, arg);
    }

    fn push_clause(&mut self, clause: &str, arg: QueryArg) {
        self.args.push(arg);
        self.sql.push_str(clause);
        self.sql.push_str(&format!("${}", self.args.len()));
    }
}

fn clamp_to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
