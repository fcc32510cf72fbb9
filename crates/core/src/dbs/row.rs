//! Dynamic row decoding for `RETURNING *` results. Only columns the model
//! knows are surfaced; `json`/`jsonb` bytes are decoded into nested values,
//! everything else follows the driver's reported type.

use serde_json::{Number, Value as Json};
use sqlx::postgres::PgRow;
use sqlx::{Column as _, Row, TypeInfo};

use crate::cat::Model;
use crate::Result;

pub fn row_to_value(model: &Model, row: &PgRow) -> Result<serde_json::Map<String, Json>> {
	let mut out = serde_json::Map::new();
	for (i, column) in row.columns().iter().enumerate() {
		let name = column.name();
		let Some(ty) = model.columns_map.get(name) else {
			continue;
		};
		let value = if ty == "json" || ty == "jsonb" {
			row.try_get::<Option<Json>, _>(i)?.unwrap_or(Json::Null)
		} else {
			decode_column(row, i, column.type_info().name())?
		};
		out.insert(name.to_owned(), value);
	}
	Ok(out)
}

fn number(n: impl Into<f64>) -> Json {
	Number::from_f64(n.into()).map(Json::Number).unwrap_or(Json::Null)
}

fn decode_column(row: &PgRow, i: usize, pg_type: &str) -> Result<Json> {
	let value = match pg_type {
		"BOOL" => row.try_get::<Option<bool>, _>(i)?.map(Json::Bool),
		"INT2" => row.try_get::<Option<i16>, _>(i)?.map(|v| Json::Number(v.into())),
		"INT4" => row.try_get::<Option<i32>, _>(i)?.map(|v| Json::Number(v.into())),
		"INT8" => row.try_get::<Option<i64>, _>(i)?.map(|v| Json::Number(v.into())),
		"FLOAT4" => row.try_get::<Option<f32>, _>(i)?.map(number),
		"FLOAT8" => row.try_get::<Option<f64>, _>(i)?.map(number),
		"NUMERIC" => row
			.try_get::<Option<sqlx::types::BigDecimal>, _>(i)?
			.and_then(|v| v.to_string().parse::<f64>().ok())
			.map(number),
		"TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" => {
			row.try_get::<Option<String>, _>(i)?.map(Json::String)
		}
		"UUID" => row.try_get::<Option<sqlx::types::Uuid>, _>(i)?.map(|v| Json::String(v.to_string())),
		"TIMESTAMP" => row
			.try_get::<Option<chrono::NaiveDateTime>, _>(i)?
			.map(|v| Json::String(v.to_string())),
		"TIMESTAMPTZ" => row
			.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)?
			.map(|v| Json::String(v.to_rfc3339())),
		"DATE" => row
			.try_get::<Option<chrono::NaiveDate>, _>(i)?
			.map(|v| Json::String(v.to_string())),
		"TIME" => row
			.try_get::<Option<chrono::NaiveTime>, _>(i)?
			.map(|v| Json::String(v.to_string())),
		"JSON" | "JSONB" => row.try_get::<Option<Json>, _>(i)?,
		"TEXT[]" | "VARCHAR[]" => row
			.try_get::<Option<Vec<String>>, _>(i)?
			.map(|v| Json::Array(v.into_iter().map(Json::String).collect())),
		"INT4[]" => row
			.try_get::<Option<Vec<i32>>, _>(i)?
			.map(|v| Json::Array(v.into_iter().map(|n| Json::Number(n.into())).collect())),
		"INT8[]" => row
			.try_get::<Option<Vec<i64>>, _>(i)?
			.map(|v| Json::Array(v.into_iter().map(|n| Json::Number(n.into())).collect())),
		"FLOAT8[]" => row
			.try_get::<Option<Vec<f64>>, _>(i)?
			.map(|v| Json::Array(v.into_iter().map(number).collect())),
		"BOOL[]" => row
			.try_get::<Option<Vec<bool>>, _>(i)?
			.map(|v| Json::Array(v.into_iter().map(Json::Bool).collect())),
		// Anything else is surfaced as text when the driver can read it
		_ => row.try_get::<Option<String>, _>(i).ok().flatten().map(Json::String),
	};
	Ok(value.unwrap_or(Json::Null))
}
