//! Conversions between `mysql_async` values and tidepool values

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::{Params, Row as MySqlRow};
use tidepool_core::{QueryResult, Value};

/// Bind parameters positionally, in `?` order
pub(crate) fn to_params(params: &[Value]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(value_to_mysql).collect())
    }
}

pub(crate) fn value_to_mysql(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(v) => mysql_async::Value::Int(i64::from(*v)),
        Value::Int64(v) => mysql_async::Value::Int(*v),
        Value::UInt64(v) => mysql_async::Value::UInt(*v),
        Value::Float64(v) => mysql_async::Value::Double(*v),
        Value::Decimal(v) | Value::String(v) => mysql_async::Value::Bytes(v.clone().into_bytes()),
        Value::Bytes(v) => mysql_async::Value::Bytes(v.clone()),
        Value::Json(v) => mysql_async::Value::Bytes(v.to_string().into_bytes()),
        Value::Date(d) => mysql_async::Value::Date(
            d.year() as u16,
            d.month() as u8,
            d.day() as u8,
            0,
            0,
            0,
            0,
        ),
        Value::Time(t) => mysql_async::Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
        Value::DateTime(dt) => mysql_async::Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.nanosecond() / 1_000,
        ),
    }
}

/// Convert a `mysql_async` value, using the column type to interpret the
/// byte strings the text protocol returns.
pub(crate) fn mysql_value_to_value(val: mysql_async::Value, col_type: ColumnType) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => match col_type {
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_YEAR => s
                    .parse::<i64>()
                    .map(Value::Int64)
                    .or_else(|_| s.parse::<u64>().map(Value::UInt64))
                    .unwrap_or(Value::String(s)),
                ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
                    s.parse::<f64>().map(Value::Float64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => Value::Decimal(s),
                ColumnType::MYSQL_TYPE_JSON => serde_json::from_str(&s)
                    .map(Value::Json)
                    .unwrap_or(Value::String(s)),
                _ => Value::String(s),
            },
            Err(err) => Value::Bytes(err.into_bytes()),
        },
        mysql_async::Value::Int(i) => Value::Int64(i),
        mysql_async::Value::UInt(u) => Value::UInt64(u),
        mysql_async::Value::Float(f) => Value::Float64(f64::from(f)),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day));
            if hour == 0 && min == 0 && sec == 0 && micro == 0 {
                date.map(Value::Date)
                    .unwrap_or_else(|| Value::String(format!("{year:04}-{month:02}-{day:02}")))
            } else {
                date.and_then(|d| {
                    d.and_hms_micro_opt(u32::from(hour), u32::from(min), u32::from(sec), micro)
                })
                .map(Value::DateTime)
                .unwrap_or_else(|| {
                    Value::String(format!(
                        "{year:04}-{month:02}-{day:02} {hour:02}:{min:02}:{sec:02}"
                    ))
                })
            }
        }
        mysql_async::Value::Time(negative, days, hours, mins, secs, micros) => {
            let time_of_day = (!negative && days == 0)
                .then(|| {
                    NaiveTime::from_hms_micro_opt(
                        u32::from(hours),
                        u32::from(mins),
                        u32::from(secs),
                        micros,
                    )
                })
                .flatten();
            time_of_day.map(Value::Time).unwrap_or_else(|| {
                let total_hours = days * 24 + u32::from(hours);
                let sign = if negative { "-" } else { "" };
                Value::String(format!("{sign}{total_hours:02}:{mins:02}:{secs:02}.{micros:06}"))
            })
        }
    }
}

/// Build a `QueryResult` from rows returned by the server
pub(crate) fn rows_to_result(rows: Vec<MySqlRow>) -> QueryResult {
    let Some(first) = rows.first() else {
        return QueryResult::empty();
    };

    let columns = first.columns_ref();
    let column_names: Vec<String> = columns.iter().map(|col| col.name_str().to_string()).collect();
    let column_types: Vec<ColumnType> = columns.iter().map(|col| col.column_type()).collect();

    let values = rows
        .into_iter()
        .map(|row| {
            MySqlRow::unwrap(row)
                .into_iter()
                .zip(column_types.iter())
                .map(|(value, col_type)| mysql_value_to_value(value, *col_type))
                .collect()
        })
        .collect();

    QueryResult::from_rows(column_names, values)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_text_protocol_integers() {
        assert_eq!(
            mysql_value_to_value(mysql_async::Value::Bytes(b"42".to_vec()), ColumnType::MYSQL_TYPE_LONGLONG),
            Value::Int64(42)
        );
        assert_eq!(
            mysql_value_to_value(
                mysql_async::Value::Bytes(b"18446744073709551615".to_vec()),
                ColumnType::MYSQL_TYPE_LONGLONG
            ),
            Value::UInt64(u64::MAX)
        );
    }

    #[test]
    fn test_decimal_keeps_text() {
        assert_eq!(
            mysql_value_to_value(mysql_async::Value::Bytes(b"500".to_vec()), ColumnType::MYSQL_TYPE_NEWDECIMAL),
            Value::Decimal("500".into())
        );
    }

    #[test]
    fn test_binary_protocol_values() {
        assert_eq!(
            mysql_value_to_value(mysql_async::Value::UInt(7), ColumnType::MYSQL_TYPE_LONGLONG),
            Value::UInt64(7)
        );
        assert_eq!(
            mysql_value_to_value(mysql_async::Value::Float(1.5), ColumnType::MYSQL_TYPE_FLOAT),
            Value::Float64(1.5)
        );
        assert_eq!(
            mysql_value_to_value(mysql_async::Value::NULL, ColumnType::MYSQL_TYPE_LONG),
            Value::Null
        );
    }

    #[test]
    fn test_dates_and_times() {
        assert_eq!(
            mysql_value_to_value(
                mysql_async::Value::Date(2024, 2, 29, 0, 0, 0, 0),
                ColumnType::MYSQL_TYPE_DATE
            ),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(
            mysql_value_to_value(
                mysql_async::Value::Time(false, 0, 13, 5, 9, 0),
                ColumnType::MYSQL_TYPE_TIME
            ),
            Value::Time(NaiveTime::from_hms_opt(13, 5, 9).unwrap())
        );
        assert_eq!(
            mysql_value_to_value(
                mysql_async::Value::Time(true, 1, 2, 0, 0, 0),
                ColumnType::MYSQL_TYPE_TIME
            ),
            Value::String("-26:00:00.000000".into())
        );
    }

    #[test]
    fn test_non_utf8_bytes_stay_binary() {
        assert_eq!(
            mysql_value_to_value(mysql_async::Value::Bytes(vec![0xff, 0xfe]), ColumnType::MYSQL_TYPE_BLOB),
            Value::Bytes(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn test_params_bind_positionally() {
        let params = to_params(&[Value::UInt64(9), Value::String("app".into()), Value::Bool(true)]);
        assert_eq!(
            params,
            Params::Positional(vec![
                mysql_async::Value::UInt(9),
                mysql_async::Value::Bytes(b"app".to_vec()),
                mysql_async::Value::Int(1),
            ])
        );
        assert_eq!(to_params(&[]), Params::Empty);
    }
}
