//! Expression interpreter for selections, derived variables and weights.
//!
//! Supported syntax:
//! - Numbers: `42`, `3.14`, `1e-3`; `true` / `false`
//! - Event fields: `nMuon`, `HLT_IsoMu24`, `Muon_pt`
//! - Indexing into collections: `Muon_charge[0]`
//! - Arithmetic: `+`, `-`, `*`, `/`
//! - Comparisons: `==`, `!=`, `<`, `<=`, `>`, `>=`
//! - Logic: `&&`, `||` (short-circuit), `!`
//! - Functions: `abs`, `sqrt`, `log`, `exp`, `pow`, `min`, `max`, `len`,
//!   `sum`, `invmass(pt1, eta1, phi1, m1, pt2, eta2, phi2, m2)`
//! - Parentheses
//!
//! Expressions are evaluated once per event. Collection fields evaluate to
//! lists; arithmetic and comparisons broadcast scalars over lists. Logic
//! operators and selections need scalars.

mod parse;
mod value;

pub use value::Value;

use crate::error::{AnalysisError, Result};
use crate::events::kinematics::pair_mass;
use crate::events::{Column, EventTable};
use parse::{BinOp, Expr, Func};

/// A parsed expression, ready to be evaluated against event tables.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    ast: Expr,
    fields: Vec<String>,
}

impl CompiledExpr {
    /// Parse an expression string.
    pub fn compile(source: &str) -> Result<Self> {
        let (ast, fields) = parse::parse(source).map_err(|e| AnalysisError::eval(source, e))?;
        Ok(Self {
            source: source.to_string(),
            ast,
            fields,
        })
    }

    /// Event fields referenced by the expression, in first-use order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Evaluate for every event.
    pub fn evaluate(&self, events: &EventTable) -> Result<Vec<Value>> {
        let columns = self
            .fields
            .iter()
            .map(|name| {
                events
                    .column(name)
                    .ok_or_else(|| AnalysisError::eval(&self.source, format!("unknown field '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;

        let ctx = RowContext { columns: &columns };
        (0..events.len())
            .map(|row| {
                ctx.eval(&self.ast, row).map_err(|reason| {
                    AnalysisError::eval(&self.source, format!("event {}: {}", row, reason))
                })
            })
            .collect()
    }

    /// Evaluate as a per-event predicate.
    pub fn mask(&self, events: &EventTable) -> Result<Vec<bool>> {
        self.evaluate(events)?
            .into_iter()
            .enumerate()
            .map(|(row, v)| match v {
                Value::Scalar(x) => Ok(Value::truthy(x)),
                Value::List(_) => Err(AnalysisError::eval(
                    &self.source,
                    format!("event {}: selection evaluates to a collection", row),
                )),
            })
            .collect()
    }

    /// Evaluate into a column: scalar when every event yields a number,
    /// jagged when every event yields a list.
    pub fn column(&self, events: &EventTable) -> Result<Column> {
        let values = self.evaluate(events)?;
        if values.iter().all(|v| matches!(v, Value::Scalar(_))) {
            return Ok(Column::Scalar(values.iter().filter_map(Value::as_scalar).collect()));
        }
        let mut rows = Vec::with_capacity(values.len());
        for v in values {
            match v {
                Value::List(list) => rows.push(list),
                Value::Scalar(_) => {
                    return Err(AnalysisError::eval(
                        &self.source,
                        "mixes numbers and collections across events",
                    ));
                }
            }
        }
        Ok(Column::jagged(rows))
    }
}

struct RowContext<'a> {
    columns: &'a [&'a Column],
}

impl RowContext<'_> {
    fn field(&self, idx: usize, row: usize) -> Value {
        let column = self.columns[idx];
        match column {
            Column::Scalar(v) => Value::Scalar(v[row]),
            Column::Jagged { .. } => Value::List(column.list(row).unwrap_or_default().to_vec()),
        }
    }

    fn scalar(&self, expr: &Expr, row: usize, what: &str) -> std::result::Result<f64, String> {
        self.eval(expr, row)?
            .as_scalar()
            .ok_or_else(|| format!("{} needs a number, got a collection", what))
    }

    fn eval(&self, expr: &Expr, row: usize) -> std::result::Result<Value, String> {
        match expr {
            Expr::Number(v) => Ok(Value::Scalar(*v)),
            Expr::Field(idx) => Ok(self.field(*idx, row)),
            Expr::Index(idx, index) => {
                let i = self.scalar(index, row, "index")?;
                let list = self.columns[*idx]
                    .list(row)
                    .ok_or_else(|| "cannot index a non-collection field".to_string())?;
                if i < 0.0 || i.fract() != 0.0 {
                    return Err(format!("invalid index {}", i));
                }
                list.get(i as usize)
                    .map(|x| Value::Scalar(*x))
                    .ok_or_else(|| format!("index {} out of range for {} entries", i, list.len()))
            }
            Expr::Neg(inner) => Ok(self.eval(inner, row)?.map(|x| -x)),
            Expr::Not(inner) => {
                let x = self.scalar(inner, row, "'!'")?;
                Ok(Value::Scalar(Value::bool(!Value::truthy(x))))
            }
            Expr::BinOp(BinOp::And, lhs, rhs) => {
                if !Value::truthy(self.scalar(lhs, row, "'&&'")?) {
                    return Ok(Value::Scalar(0.0));
                }
                let r = self.scalar(rhs, row, "'&&'")?;
                Ok(Value::Scalar(Value::bool(Value::truthy(r))))
            }
            Expr::BinOp(BinOp::Or, lhs, rhs) => {
                if Value::truthy(self.scalar(lhs, row, "'||'")?) {
                    return Ok(Value::Scalar(1.0));
                }
                let r = self.scalar(rhs, row, "'||'")?;
                Ok(Value::Scalar(Value::bool(Value::truthy(r))))
            }
            Expr::BinOp(op, lhs, rhs) => {
                let (a, b) = (self.eval(lhs, row)?, self.eval(rhs, row)?);
                let f: fn(f64, f64) -> f64 = match op {
                    BinOp::Add => |a, b| a + b,
                    BinOp::Sub => |a, b| a - b,
                    BinOp::Mul => |a, b| a * b,
                    BinOp::Div => |a, b| a / b,
                    BinOp::Eq => |a, b| Value::bool(a == b),
                    BinOp::Ne => |a, b| Value::bool(a != b),
                    BinOp::Lt => |a, b| Value::bool(a < b),
                    BinOp::Le => |a, b| Value::bool(a <= b),
                    BinOp::Gt => |a, b| Value::bool(a > b),
                    BinOp::Ge => |a, b| Value::bool(a >= b),
                    BinOp::And | BinOp::Or => unreachable!("handled above"),
                };
                a.zip_with(b, f)
            }
            Expr::Call(func, args) => self.call(*func, args, row),
        }
    }

    fn call(&self, func: Func, args: &[Expr], row: usize) -> std::result::Result<Value, String> {
        match func {
            Func::Abs => Ok(self.eval(&args[0], row)?.map(f64::abs)),
            Func::Sqrt => Ok(self.eval(&args[0], row)?.map(f64::sqrt)),
            Func::Log => Ok(self.eval(&args[0], row)?.map(f64::ln)),
            Func::Exp => Ok(self.eval(&args[0], row)?.map(f64::exp)),
            Func::Pow => self.eval(&args[0], row)?.zip_with(self.eval(&args[1], row)?, f64::powf),
            Func::Min => self.eval(&args[0], row)?.zip_with(self.eval(&args[1], row)?, f64::min),
            Func::Max => self.eval(&args[0], row)?.zip_with(self.eval(&args[1], row)?, f64::max),
            Func::Len | Func::Sum => match self.eval(&args[0], row)? {
                Value::List(v) if func == Func::Len => Ok(Value::Scalar(v.len() as f64)),
                Value::List(v) => Ok(Value::Scalar(v.iter().sum())),
                Value::Scalar(_) => Err("len() and sum() need a collection".to_string()),
            },
            Func::InvMass => {
                let mut p = [0.0; 8];
                for (slot, arg) in p.iter_mut().zip(args) {
                    *slot = self.scalar(arg, row, "invmass()")?;
                }
                Ok(Value::Scalar(pair_mass(
                    [p[0], p[1], p[2], p[3]],
                    [p[4], p[5], p[6], p[7]],
                )))
            }
        }
    }
}
