//! Butcher tableaus for the embedded explicit Runge–Kutta pairs.
//!
//! Coefficients are kept as decimal or rational literals and converted into the
//! working precision on demand, so an extended-precision run sees every exact
//! rational at full precision instead of a rounded `f64`.

use crate::double_double::ExtFloat;
use crate::traits::Scalar;
use num_traits::{Float, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Consistency checks run in extended precision and allow this many `ExtFloat`
/// epsilons, scaled by the magnitude of the terms being summed.
const CONSISTENCY_EPSILONS: f64 = 64.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableauName {
    /// Tsitouras 5(4), 7 stages, FSAL.
    #[serde(rename = "tsit5")]
    Tsit5,
    /// Dormand–Prince 5(4), 7 stages, FSAL.
    #[serde(rename = "dp5")]
    DormandPrince5,
    /// Verner 6(5) "efficient" pair, 9 stages, FSAL.
    #[serde(rename = "vern6")]
    Verner6,
}

impl TableauName {
    pub const ALL: [TableauName; 3] = [Self::Tsit5, Self::DormandPrince5, Self::Verner6];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tsit5 => "tsit5",
            Self::DormandPrince5 => "dp5",
            Self::Verner6 => "vern6",
        }
    }
}

impl fmt::Display for TableauName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableauName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tsit5" | "tsitouras5" => Ok(Self::Tsit5),
            "dp5" | "dopri5" | "dormand-prince" | "dormandprince5" => Ok(Self::DormandPrince5),
            "vern6" | "verner6" => Ok(Self::Verner6),
            other => Err(format!(
                "unknown method `{other}` (expected tsit5, dp5 or vern6)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableauError {
    #[error("tableau `{name}`: coefficient `{literal}` is not a valid number")]
    InvalidLiteral { name: String, literal: String },
    #[error("tableau `{name}` needs at least two stages, found {stages}")]
    TooFewStages { name: String, stages: usize },
    #[error(
        "tableau `{name}`: row {row} of A has {found} entries, a strictly lower-triangular row needs {expected}"
    )]
    NotLowerTriangular {
        name: String,
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("tableau `{name}`: {what} has length {found}, expected {expected}")]
    LengthMismatch {
        name: String,
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("tableau `{name}`: row {row} of A sums to {sum}, but c[{row}] = {node}")]
    RowSumMismatch {
        name: String,
        row: usize,
        sum: f64,
        node: f64,
    },
    #[error("tableau `{name}`: {which} weights sum to {sum}, expected 1")]
    WeightSum {
        name: String,
        which: &'static str,
        sum: f64,
    },
    #[error("tableau `{name}`: order {order} and embedded order {embedded} must differ by one")]
    OrderGap {
        name: String,
        order: u32,
        embedded: u32,
    },
    #[error("tableau `{name}` is marked first-same-as-last, but its last stage is not the solution")]
    FsalMismatch { name: String },
    #[error("tableau `{name}`: Hermite dense output needs a first-same-as-last tableau")]
    HermiteWithoutFsal { name: String },
}

/// Step-size controller gains shipped with a tableau.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerCoefficients {
    pub safety: f64,
    pub beta: f64,
}

impl Default for ControllerCoefficients {
    fn default() -> Self {
        Self {
            safety: 0.9,
            beta: 0.2,
        }
    }
}

/// Continuous extension used between accepted steps.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpolant {
    /// Cubic Hermite on the endpoint slopes `k_1` and `k_s`.
    Hermite,
    /// Dormand–Prince fourth-order extension with weights `d`.
    DormandPrince { d: Vec<&'static str> },
}

/// Raw tableau data before validation.
#[derive(Debug, Clone)]
pub struct TableauSpec {
    pub name: &'static str,
    /// Row `i` holds `a[i][0..i]`.
    pub a: Vec<Vec<&'static str>>,
    pub b: Vec<&'static str>,
    pub b_embedded: Vec<&'static str>,
    pub c: Vec<&'static str>,
    pub order: u32,
    pub embedded_order: u32,
    pub fsal: bool,
    pub controller: ControllerCoefficients,
    pub interpolant: Interpolant,
}

/// A validated embedded Runge–Kutta pair.
#[derive(Debug, Clone)]
pub struct Tableau {
    spec: TableauSpec,
}

/// Tableau coefficients converted into a working precision.
#[derive(Debug, Clone)]
pub struct Coefficients<T> {
    /// Row `i` holds `a[i][0..i]`.
    pub a: Vec<Vec<T>>,
    pub b: Vec<T>,
    /// Error weights `b - b_embedded`.
    pub e: Vec<T>,
    pub c: Vec<T>,
    /// Dense-output weights, empty for Hermite interpolation.
    pub dense: Vec<T>,
}

impl Tableau {
    /// Validates raw coefficients.
    pub fn new(spec: TableauSpec) -> Result<Self, TableauError> {
        let name = spec.name.to_string();
        let stages = spec.c.len();
        if stages < 2 {
            return Err(TableauError::TooFewStages { name, stages });
        }
        if spec.a.len() != stages {
            return Err(TableauError::LengthMismatch {
                name,
                what: "A",
                expected: stages,
                found: spec.a.len(),
            });
        }
        for (what, len) in [("b", spec.b.len()), ("embedded b", spec.b_embedded.len())] {
            if len != stages {
                return Err(TableauError::LengthMismatch {
                    name,
                    what,
                    expected: stages,
                    found: len,
                });
            }
        }
        for (row, entries) in spec.a.iter().enumerate() {
            if entries.len() != row {
                return Err(TableauError::NotLowerTriangular {
                    name,
                    row,
                    expected: row,
                    found: entries.len(),
                });
            }
        }
        if let Interpolant::DormandPrince { d } = &spec.interpolant {
            if d.len() != stages {
                return Err(TableauError::LengthMismatch {
                    name,
                    what: "dense weights",
                    expected: stages,
                    found: d.len(),
                });
            }
        }

        let reference = Self::convert::<ExtFloat>(&spec)?;
        let tolerance = ExtFloat::epsilon() * ExtFloat::from(CONSISTENCY_EPSILONS);
        let consistent = |sum: ExtFloat, target: ExtFloat, terms: &[ExtFloat]| {
            let scale = terms.iter().fold(target.abs(), |acc, v| acc + v.abs());
            (sum - target).abs() <= tolerance * scale
        };
        let total = |terms: &[ExtFloat]| terms.iter().fold(ExtFloat::zero(), |acc, &v| acc + v);
        let one = ExtFloat::from(1.0);

        for (row, (entries, &node)) in reference.a.iter().zip(&reference.c).enumerate() {
            let sum = total(entries.as_slice());
            if !consistent(sum, node, entries.as_slice()) {
                return Err(TableauError::RowSumMismatch {
                    name,
                    row,
                    sum: sum.to_reference(),
                    node: node.to_reference(),
                });
            }
        }

        let b_sum = total(&reference.b[..]);
        if !consistent(b_sum, one, &reference.b[..]) {
            return Err(TableauError::WeightSum {
                name,
                which: "primary",
                sum: b_sum.to_reference(),
            });
        }
        let b_embedded: Vec<ExtFloat> = reference
            .b
            .iter()
            .zip(&reference.e)
            .map(|(&b, &e)| b - e)
            .collect();
        let embedded_sum = total(&b_embedded[..]);
        if !consistent(embedded_sum, one, &b_embedded[..]) {
            return Err(TableauError::WeightSum {
                name,
                which: "embedded",
                sum: embedded_sum.to_reference(),
            });
        }

        if spec.order != spec.embedded_order + 1 {
            return Err(TableauError::OrderGap {
                name,
                order: spec.order,
                embedded: spec.embedded_order,
            });
        }

        if spec.fsal {
            let last = &reference.a[stages - 1];
            let matches_b = last.iter().zip(&reference.b).all(|(a, b)| a == b);
            if !matches_b || !reference.b[stages - 1].is_zero() || reference.c[stages - 1] != one {
                return Err(TableauError::FsalMismatch { name });
            }
        } else if spec.interpolant == Interpolant::Hermite {
            return Err(TableauError::HermiteWithoutFsal { name });
        }

        Ok(Self { spec })
    }

    /// Returns the process-wide tableau for `name`, validating it on first use.
    pub fn get(name: TableauName) -> Result<&'static Tableau, TableauError> {
        static TSIT5: OnceLock<Result<Tableau, TableauError>> = OnceLock::new();
        static DP5: OnceLock<Result<Tableau, TableauError>> = OnceLock::new();
        static VERN6: OnceLock<Result<Tableau, TableauError>> = OnceLock::new();

        let cell = match name {
            TableauName::Tsit5 => TSIT5.get_or_init(|| Self::new(tsit5())),
            TableauName::DormandPrince5 => DP5.get_or_init(|| Self::new(dormand_prince5())),
            TableauName::Verner6 => VERN6.get_or_init(|| Self::new(verner6())),
        };
        cell.as_ref().map_err(Clone::clone)
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn stages(&self) -> usize {
        self.spec.c.len()
    }

    pub fn order(&self) -> u32 {
        self.spec.order
    }

    pub fn embedded_order(&self) -> u32 {
        self.spec.embedded_order
    }

    pub fn fsal(&self) -> bool {
        self.spec.fsal
    }

    pub fn controller(&self) -> ControllerCoefficients {
        self.spec.controller
    }

    pub fn interpolant(&self) -> &Interpolant {
        &self.spec.interpolant
    }

    /// Converts the coefficients into `T`.
    pub fn coefficients<T: Scalar>(&self) -> Result<Coefficients<T>, TableauError> {
        Self::convert(&self.spec)
    }

    fn convert<T: Scalar>(spec: &TableauSpec) -> Result<Coefficients<T>, TableauError> {
        let parse = |literal: &'static str| {
            T::literal(literal).ok_or_else(|| TableauError::InvalidLiteral {
                name: spec.name.to_string(),
                literal: literal.to_string(),
            })
        };
        let parse_all = |literals: &[&'static str]| {
            literals.iter().map(|&l| parse(l)).collect::<Result<Vec<T>, _>>()
        };

        let a = spec
            .a
            .iter()
            .map(|row| parse_all(row))
            .collect::<Result<Vec<_>, _>>()?;
        let b = parse_all(&spec.b)?;
        let b_embedded = parse_all(&spec.b_embedded)?;
        let e = b.iter().zip(&b_embedded).map(|(&b, &bh)| b - bh).collect();
        let c = parse_all(&spec.c)?;
        let dense = match &spec.interpolant {
            Interpolant::Hermite => Vec::new(),
            Interpolant::DormandPrince { d } => parse_all(d)?,
        };

        Ok(Coefficients { a, b, e, c, dense })
    }
}

fn tsit5() -> TableauSpec {
    let b = vec![
        "0.09646076681806522951816731316512876",
        "0.01",
        "0.4798896504144995747752495322905965",
        "1.379008574103741893192274821856873",
        "-3.290069515436080679901047585711364",
        "2.324710524099773982415355918398766",
    ];
    TableauSpec {
        name: "tsit5",
        a: vec![
            vec![],
            vec!["0.161"],
            vec![
                "-0.008480655492356988544426874250230775",
                "0.3354806554923569885444268742502308",
            ],
            vec![
                "2.897153057105493432130432594192939",
                "-6.359448489975074843148159912383826",
                "4.362295432869581411017727318190887",
            ],
            vec![
                "5.325864828439256604428877920840511",
                "-11.74888356406282787774717033978577",
                "7.495539342889836208304604784564358",
                "-0.09249506636175524925650207933207192",
            ],
            vec![
                "5.861455442946420028659251486982648",
                "-12.92096931784710929170611868178336",
                "8.159367898576158643180400794539253",
                "-0.07158497328140099722453054252582974",
                "-0.02826905039406838290900305721271224",
            ],
            b.clone(),
        ],
        b_embedded: vec![
            "0.0982407778702910009615458637726683",
            "0.01081643445965674690322363606335469",
            "0.4720087724042375787649348046180702",
            "1.523719581277004800729439969829508",
            "-3.872426680888635904920985196363406",
            "2.78279263002896092907699243723132",
            "-1/66",
        ],
        b: [b, vec!["0"]].concat(),
        c: vec![
            "0",
            "0.161",
            "0.327",
            "0.9",
            "0.9800255409045096857298102862870246",
            "1",
            "1",
        ],
        order: 5,
        embedded_order: 4,
        fsal: true,
        controller: ControllerCoefficients::default(),
        interpolant: Interpolant::Hermite,
    }
}

fn dormand_prince5() -> TableauSpec {
    TableauSpec {
        name: "dp5",
        a: vec![
            vec![],
            vec!["1/5"],
            vec!["3/40", "9/40"],
            vec!["44/45", "-56/15", "32/9"],
            vec!["19372/6561", "-25360/2187", "64448/6561", "-212/729"],
            vec!["9017/3168", "-355/33", "46732/5247", "49/176", "-5103/18656"],
            vec!["35/384", "0", "500/1113", "125/192", "-2187/6784", "11/84"],
        ],
        b: vec!["35/384", "0", "500/1113", "125/192", "-2187/6784", "11/84", "0"],
        b_embedded: vec![
            "5179/57600",
            "0",
            "7571/16695",
            "393/640",
            "-92097/339200",
            "187/2100",
            "1/40",
        ],
        c: vec!["0", "1/5", "3/10", "4/5", "8/9", "1", "1"],
        order: 5,
        embedded_order: 4,
        fsal: true,
        controller: ControllerCoefficients::default(),
        interpolant: Interpolant::DormandPrince {
            d: vec![
                "-12715105075/11282082432",
                "0",
                "87487479700/32700410799",
                "-10690763975/1880347072",
                "701980252875/199316789632",
                "-1453857185/822651844",
                "69997945/29380423",
            ],
        },
    }
}

fn verner6() -> TableauSpec {
    let b = vec![
        "0.03438957868357036009278820124728322",
        "0",
        "0",
        "0.2582624555633503404659558098586121",
        "0.4209371189673537150642551514069802",
        "626271188750/142160006043",
        "-51160788125000/289890548217",
        "163193540017/946795234",
    ];
    TableauSpec {
        name: "vern6",
        a: vec![
            vec![],
            vec!["0.06"],
            vec!["519479/27000000", "2070721/27000000"],
            vec!["0.035975", "0", "0.107925"],
            vec![
                "109225017611/82828840000",
                "0",
                "-417627820623/82828840000",
                "43699198143/10353605000",
            ],
            vec![
                "-41.87259166432751461803757780644347",
                "0",
                "159.4325621631374917700365669070347",
                "-122.1192135650100309202516203389242",
                "5.531743066200053768252631238332999",
            ],
            vec![
                "-54.43015693531650433250642051294142",
                "0",
                "207.067251365018464427365717386651",
                "-158.6108137845899991828742424365059",
                "6.991816585950242321992597280791794",
                "-0.01859723106220323397765171799549295",
            ],
            vec![
                "-54.66374178728197680241215648050387",
                "0",
                "207.9528062553893734515824816699834",
                "-159.2889574744995071508959805871427",
                "7.018743740796944434698170760964252",
                "-0.01833878590504572306472782005141738",
                "-0.0005119484997882099077875432497245168",
            ],
            b.clone(),
        ],
        b_embedded: vec![
            "0.04904804485768471537351919492340573",
            "0",
            "0",
            "0.2252275819365847777039242889000805",
            "0.4692978838155973718106896903934104",
            "0.8192108736151487059212637490688175",
            "-0.6194459442246635758344782218491336",
            "0",
            "0.05666155999964800502508129856341945",
        ],
        b: [b, vec!["0"]].concat(),
        c: vec![
            "0",
            "0.06",
            "1439/15000",
            "0.1439",
            "0.4973",
            "0.9725",
            "0.9995",
            "1",
            "1",
        ],
        order: 6,
        embedded_order: 5,
        fsal: true,
        controller: ControllerCoefficients::default(),
        interpolant: Interpolant::Hermite,
    }
}

#[cfg(test)]
mod tests {
    use super::{Interpolant, Tableau, TableauError, TableauName, TableauSpec};
    use crate::double_double::ExtFloat;
    use crate::traits::Scalar;
    use num_traits::Float;

    fn heun_euler() -> TableauSpec {
        TableauSpec {
            name: "heun-euler",
            a: vec![vec![], vec!["1"]],
            b: vec!["1/2", "1/2"],
            b_embedded: vec!["1", "0"],
            c: vec!["0", "1"],
            order: 2,
            embedded_order: 1,
            fsal: false,
            controller: Default::default(),
            interpolant: Interpolant::DormandPrince { d: vec!["0", "0"] },
        }
    }

    #[test]
    fn registry_tableaus_validate() {
        for name in TableauName::ALL {
            let tableau = Tableau::get(name).expect("bundled tableau is consistent");
            assert_eq!(tableau.name(), name.as_str());
            assert!(tableau.fsal());
            assert_eq!(tableau.order(), tableau.embedded_order() + 1);
        }
        assert_eq!(Tableau::get(TableauName::Verner6).unwrap().stages(), 9);
        assert_eq!(Tableau::get(TableauName::Verner6).unwrap().order(), 6);
    }

    #[test]
    fn registry_returns_the_same_instance() {
        let first = Tableau::get(TableauName::Tsit5).unwrap();
        let second = Tableau::get(TableauName::Tsit5).unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn row_sums_hold_in_every_precision() {
        for name in TableauName::ALL {
            let tableau = Tableau::get(name).unwrap();
            let coeffs = tableau.coefficients::<ExtFloat>().unwrap();
            for (row, node) in coeffs.a.iter().zip(&coeffs.c) {
                let sum = row.iter().fold(ExtFloat::from(0.0), |acc, &v| acc + v);
                assert!((sum - *node).abs().to_reference() < 1e-27, "{name}");
            }
            let narrow = tableau.coefficients::<f32>().unwrap();
            assert_eq!(narrow.b.len(), tableau.stages());
        }
    }

    #[test]
    fn rational_coefficients_are_exact_in_extended_precision() {
        let tableau = Tableau::get(TableauName::DormandPrince5).unwrap();
        let coeffs = tableau.coefficients::<ExtFloat>().unwrap();
        let expected = ExtFloat::literal("1/5").unwrap();
        assert_eq!(coeffs.c[1], expected);
        let a = coeffs.a[4][0] * ExtFloat::from(6561.0);
        assert!((a - ExtFloat::from(19372.0)).abs().to_reference() < 1e-27);
        let dense = &coeffs.dense;
        assert_eq!(dense.len(), 7);
    }

    #[test]
    fn error_weights_sum_to_zero() {
        for name in TableauName::ALL {
            let coeffs = Tableau::get(name).unwrap().coefficients::<ExtFloat>().unwrap();
            let sum = coeffs.e.iter().fold(ExtFloat::from(0.0), |acc, &v| acc + v);
            assert!(sum.abs().to_reference() < 1e-27, "{name}: {sum}");
        }
    }

    /// `sum_i w_i c_i^(k-1) = 1/k` for every `k` up to the order of the weights.
    fn quadrature_defect(weights: &[ExtFloat], nodes: &[ExtFloat], order: u32) -> f64 {
        (1..=order)
            .map(|k| {
                let exponent = i32::try_from(k).unwrap() - 1;
                let integral = weights
                    .iter()
                    .zip(nodes)
                    .fold(ExtFloat::from(0.0), |acc, (&w, &c)| acc + w * c.powi(exponent));
                (integral - ExtFloat::from(1.0) / ExtFloat::from(f64::from(k)))
                    .abs()
                    .to_reference()
            })
            .fold(0.0, f64::max)
    }

    #[test]
    fn weights_hold_to_extended_precision() {
        for name in TableauName::ALL {
            let tableau = Tableau::get(name).unwrap();
            let coeffs = tableau.coefficients::<ExtFloat>().unwrap();
            let primary = quadrature_defect(&coeffs.b, &coeffs.c, tableau.order());
            assert!(primary < 1e-27, "{name}: primary defect {primary:e}");

            let embedded: Vec<ExtFloat> =
                coeffs.b.iter().zip(&coeffs.e).map(|(&b, &e)| b - e).collect();
            let defect = quadrature_defect(&embedded, &coeffs.c, tableau.embedded_order());
            assert!(defect < 1e-27, "{name}: embedded defect {defect:e}");
        }
    }

    #[test]
    fn rejects_weights_rounded_to_double() {
        let mut spec = heun_euler();
        spec.b = vec!["0.5", "0.5000000000000001"];
        assert!(matches!(
            Tableau::new(spec),
            Err(TableauError::WeightSum { which: "primary", .. })
        ));
    }

    #[test]
    fn non_fsal_pair_with_dense_weights_validates() {
        let tableau = Tableau::new(heun_euler()).expect("consistent pair");
        assert!(!tableau.fsal());
        assert_eq!(tableau.stages(), 2);
    }

    #[test]
    fn rejects_upper_triangular_entries() {
        let mut spec = heun_euler();
        spec.a[0] = vec!["0"];
        assert!(matches!(
            Tableau::new(spec),
            Err(TableauError::NotLowerTriangular { row: 0, .. })
        ));
    }

    #[test]
    fn rejects_inconsistent_nodes() {
        let mut spec = heun_euler();
        spec.c[1] = "0.9";
        assert!(matches!(
            Tableau::new(spec),
            Err(TableauError::RowSumMismatch { row: 1, .. })
        ));
    }

    #[test]
    fn rejects_bad_weights() {
        let mut spec = heun_euler();
        spec.b = vec!["1/2", "1/3"];
        assert!(matches!(
            Tableau::new(spec),
            Err(TableauError::WeightSum { which: "primary", .. })
        ));

        let mut spec = heun_euler();
        spec.b_embedded = vec!["1", "1"];
        assert!(matches!(
            Tableau::new(spec),
            Err(TableauError::WeightSum { which: "embedded", .. })
        ));
    }

    #[test]
    fn rejects_order_gap() {
        let mut spec = heun_euler();
        spec.order = 3;
        assert!(matches!(
            Tableau::new(spec),
            Err(TableauError::OrderGap { order: 3, embedded: 1, .. })
        ));
    }

    #[test]
    fn rejects_hermite_without_fsal() {
        let mut spec = heun_euler();
        spec.interpolant = Interpolant::Hermite;
        assert!(matches!(
            Tableau::new(spec),
            Err(TableauError::HermiteWithoutFsal { .. })
        ));
    }

    #[test]
    fn rejects_fsal_flag_on_non_fsal_pair() {
        let mut spec = heun_euler();
        spec.fsal = true;
        assert!(matches!(Tableau::new(spec), Err(TableauError::FsalMismatch { .. })));
    }

    #[test]
    fn rejects_garbage_literals() {
        let mut spec = heun_euler();
        spec.b[0] = "one half";
        let err = Tableau::new(spec).unwrap_err();
        assert!(err.to_string().contains("one half"));
    }

    #[test]
    fn parses_method_names() {
        assert_eq!("Tsit5".parse::<TableauName>(), Ok(TableauName::Tsit5));
        assert_eq!("dopri5".parse::<TableauName>(), Ok(TableauName::DormandPrince5));
        assert_eq!("vern6".parse::<TableauName>(), Ok(TableauName::Verner6));
        assert!("rk4".parse::<TableauName>().is_err());
    }
}
