use cypherlite::query_planner::ResultOrder;
use cypherlite::{ResultHandler, RowAction, Value};

/// Routes engine logs into the test harness output; `RUST_LOG=debug`
/// shows every SQL statement the planner issues.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Collects rows flattened back into RETURN-clause order, the way a client
/// would read them.
#[derive(Default)]
pub struct RowCollector {
    pub order: ResultOrder,
    pub variables: Vec<Option<String>>,
    pub column_names: Vec<Vec<String>>,
    pub rows: Vec<Vec<Value>>,
    pub columns_calls: usize,
    /// When set, asks the engine to stop after this many rows.
    pub stop_after: Option<usize>,
}

impl RowCollector {
    pub fn new() -> Self {
        RowCollector::default()
    }

    pub fn stopping_after(count: usize) -> Self {
        RowCollector {
            stop_after: Some(count),
            ..RowCollector::default()
        }
    }

    /// Rows as a multiset, for order-insensitive comparisons.
    pub fn sorted_rows(&self) -> Vec<Vec<Value>> {
        let mut rows = self.rows.clone();
        rows.sort();
        rows
    }
}

impl ResultHandler for RowCollector {
    fn on_order_and_column_names(
        &mut self,
        order: &ResultOrder,
        variables: &[Option<&str>],
        column_names: &[Vec<String>],
    ) {
        self.columns_calls += 1;
        self.order = order.clone();
        self.variables = variables
            .iter()
            .map(|var| var.map(|v| v.to_string()))
            .collect();
        self.column_names = column_names.to_vec();
    }

    fn on_row(&mut self, values: &[&[Value]]) -> RowAction {
        let row = self
            .order
            .iter()
            .map(|(segment, offset)| values[*segment][*offset].clone())
            .collect();
        self.rows.push(row);
        if self.stop_after.is_some_and(|stop| self.rows.len() >= stop) {
            RowAction::Stop
        } else {
            RowAction::Continue
        }
    }
}

pub fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|i| Value::Integer(*i)).collect()
}
