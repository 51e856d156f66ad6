//! Vector fields selectable from the command line.

use anyhow::{bail, Context, Result};
use clap::Args;
use driftlab_core::expression::ExpressionField;
use driftlab_core::models::{ModelName, ReplicatorModel};
use driftlab_core::traits::{Scalar, VectorField};

#[derive(Args, Debug, Clone)]
pub struct FieldArgs {
    /// Bundled model (original2, modified2, original3, modified3)
    #[arg(long, default_value = "original3")]
    pub model: ModelName,

    /// User-defined equation `NAME=EXPR`, one per state variable, in state order.
    /// Replaces `--model`.
    #[arg(long = "equation", value_name = "NAME=EXPR")]
    pub equations: Vec<String>,

    /// Parameter `NAME=VALUE` referenced by the equations. Values keep extended precision.
    #[arg(long = "param", value_name = "NAME=VALUE", requires = "equations")]
    pub params: Vec<String>,

    /// State, comma separated. Defaults to the bundled model's reference state.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub state: Option<Vec<f64>>,
}

pub enum Field {
    Model(ReplicatorModel),
    Expression(ExpressionField),
}

impl<T: Scalar> VectorField<T> for Field {
    fn dimension(&self) -> usize {
        match self {
            Field::Model(model) => model.dimension(),
            Field::Expression(field) => field.dimension(),
        }
    }

    fn apply(&self, t: T, x: &[T], out: &mut [T]) {
        match self {
            Field::Model(model) => model.apply(t, x, out),
            Field::Expression(field) => field.apply(t, x, out),
        }
    }
}

fn split_assignment(text: &str) -> Result<(&str, &str)> {
    let (name, value) = text
        .split_once('=')
        .with_context(|| format!("expected NAME=VALUE, got '{text}'"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("missing name in '{text}'");
    }
    Ok((name, value.trim()))
}

impl FieldArgs {
    /// Short label for logs and JSON output.
    pub fn label(&self) -> String {
        if self.equations.is_empty() {
            self.model.to_string()
        } else {
            "expression".to_string()
        }
    }

    pub fn build(&self) -> Result<Field> {
        if self.equations.is_empty() {
            return Ok(Field::Model(self.model.model()));
        }

        let equations = self
            .equations
            .iter()
            .map(|e| split_assignment(e))
            .collect::<Result<Vec<_>>>()?;
        let params = self
            .params
            .iter()
            .map(|p| split_assignment(p))
            .collect::<Result<Vec<_>>>()?;

        let var_names: Vec<&str> = equations.iter().map(|(name, _)| *name).collect();
        let sources: Vec<&str> = equations.iter().map(|(_, src)| *src).collect();
        let param_names: Vec<&str> = params.iter().map(|(name, _)| *name).collect();
        let placeholders = vec![0.0; params.len()];

        let mut field = ExpressionField::new(&var_names, &sources, &param_names, &placeholders)?;
        for (name, value) in &params {
            field
                .set_parameter(name, value)
                .with_context(|| format!("invalid value for parameter '{name}'"))?;
        }
        tracing::debug!(variables = var_names.len(), parameters = params.len(), "compiled equations");
        Ok(Field::Expression(field))
    }

    /// The explicit `--state`, or the bundled model's reference state.
    pub fn state(&self, field: &Field) -> Result<Vec<f64>> {
        let dim = VectorField::<f64>::dimension(field);
        let state = match (&self.state, field) {
            (Some(state), _) => state.clone(),
            (None, Field::Model(_)) => self.model.default_state(),
            (None, Field::Expression(_)) => bail!("--state is required with --equation"),
        };
        if state.len() != dim {
            bail!("state has {} components but the field has dimension {dim}", state.len());
        }
        Ok(state)
    }
}
