//! Small cross-module helpers

/// Unique id stamped on each cycle report
pub fn report_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Signed percentage move from `old_value` to `new_value`; zero when the
/// old value gives no basis
pub fn percentage_change(old_value: f64, new_value: f64) -> f64 {
    if old_value != 0.0 {
        ((new_value - old_value) / old_value) * 100.0
    } else {
        0.0
    }
}
