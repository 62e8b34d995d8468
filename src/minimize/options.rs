use crate::minimize::{
    MinimizerError,
    constraint::Constraint,
    grid::GridAxis,
    objective::LeastSquaresFn,
};
use ndarray::prelude::*;
use serde::Serialize;
use simple_error::{SimpleError, bail};
use std::fmt;
use std::str::FromStr;

/// Strip case and separators so that "Steepest descent", "steepest-descent" and
/// "SteepestDescent" compare equal.
fn normalise(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Minimisation algorithms reachable through the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Algorithm {
    Fixed,
    Grid,
    SteepestDescent,
    CoordinateDescent,
    Bfgs,
    Newton,
    NewtonCg,
    LevenbergMarquardt,
    CauchyPoint,
    Dogleg,
    Steihaug,
    FletcherReeves,
    PolakRibiere,
    PolakRibierePlus,
    HestenesStiefel,
    MethodOfMultipliers,
}

impl Algorithm {
    pub fn from_string(val: String) -> Result<Algorithm, SimpleError> {
        val.parse()
    }

    pub fn accepts_line_search(&self) -> bool {
        matches!(
            self,
            Algorithm::SteepestDescent
                | Algorithm::CoordinateDescent
                | Algorithm::Bfgs
                | Algorithm::Newton
                | Algorithm::NewtonCg
                | Algorithm::FletcherReeves
                | Algorithm::PolakRibiere
                | Algorithm::PolakRibierePlus
                | Algorithm::HestenesStiefel
        )
    }

    pub fn accepts_hessian_mod(&self) -> bool {
        matches!(self, Algorithm::Newton | Algorithm::Dogleg)
    }

    pub fn is_trust_region(&self) -> bool {
        matches!(
            self,
            Algorithm::CauchyPoint | Algorithm::Dogleg | Algorithm::Steihaug
        )
    }

    /// Whether the algorithm runs on iterates and can be nested in the method of multipliers
    pub fn is_unconstrained(&self) -> bool {
        !matches!(
            self,
            Algorithm::Fixed | Algorithm::Grid | Algorithm::MethodOfMultipliers
        )
    }
}

impl FromStr for Algorithm {
    type Err = SimpleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "fixed" => Ok(Algorithm::Fixed),
            "grid" | "gridsearch" => Ok(Algorithm::Grid),
            "sd" | "steepestdescent" => Ok(Algorithm::SteepestDescent),
            "cd" | "coordinatedescent" => Ok(Algorithm::CoordinateDescent),
            "bfgs" => Ok(Algorithm::Bfgs),
            "newton" | "ntn" => Ok(Algorithm::Newton),
            "ncg" | "newtoncg" | "newtonconjugategradient" => Ok(Algorithm::NewtonCg),
            "lm" | "levenbergmarquardt" => Ok(Algorithm::LevenbergMarquardt),
            "cauchy" | "cauchypoint" => Ok(Algorithm::CauchyPoint),
            "dogleg" => Ok(Algorithm::Dogleg),
            "steihaug" | "cgsteihaug" | "cgs" => Ok(Algorithm::Steihaug),
            "fr" | "fletcherreeves" => Ok(Algorithm::FletcherReeves),
            "pr" | "polakribiere" => Ok(Algorithm::PolakRibiere),
            "pr+" | "polakribiere+" | "polakribiereplus" => Ok(Algorithm::PolakRibierePlus),
            "hs" | "hestenesstiefel" => Ok(Algorithm::HestenesStiefel),
            "mom" | "methodofmultipliers" | "augmentedlagrangian" => {
                Ok(Algorithm::MethodOfMultipliers)
            }
            _ => Err(SimpleError::new(format!(
                "the minimiser '{}' is not recognised",
                s
            ))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let val = match self {
            Algorithm::Fixed => "Fixed parameter values",
            Algorithm::Grid => "Grid search",
            Algorithm::SteepestDescent => "Steepest descent",
            Algorithm::CoordinateDescent => "Back-and-forth coordinate descent",
            Algorithm::Bfgs => "Quasi-Newton BFGS",
            Algorithm::Newton => "Newton",
            Algorithm::NewtonCg => "Newton Conjugate Gradient",
            Algorithm::LevenbergMarquardt => "Levenberg-Marquardt",
            Algorithm::CauchyPoint => "Cauchy point",
            Algorithm::Dogleg => "Dogleg",
            Algorithm::Steihaug => "CG-Steihaug",
            Algorithm::FletcherReeves => "Fletcher-Reeves",
            Algorithm::PolakRibiere => "Polak-Ribiere",
            Algorithm::PolakRibierePlus => "Polak-Ribiere +",
            Algorithm::HestenesStiefel => "Hestenes-Stiefel",
            Algorithm::MethodOfMultipliers => "Method of Multipliers",
        };
        write!(f, "{}", val)
    }
}

/// Line search strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LineSearchKind {
    Backtrack,
    NocedalWrightInterpol,
    NocedalWrightWolfe,
    MoreThuente,
    NoLineSearch,
}

impl fmt::Display for LineSearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let val = match self {
            LineSearchKind::Backtrack => "Backtracking",
            LineSearchKind::NocedalWrightInterpol => "Nocedal and Wright interpolation",
            LineSearchKind::NocedalWrightWolfe => "Nocedal and Wright for the Wolfe conditions",
            LineSearchKind::MoreThuente => "More and Thuente",
            LineSearchKind::NoLineSearch => "No line search",
        };
        write!(f, "{}", val)
    }
}

/// Hessian modifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HessianModKind {
    Gmw,
    Se99,
    AddedIdentity,
    NoMod,
}

impl fmt::Display for HessianModKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let val = match self {
            HessianModKind::Gmw => "GMW81",
            HessianModKind::Se99 => "SE99",
            HessianModKind::AddedIdentity => "Cholesky with added multiple of the identity",
            HessianModKind::NoMod => "Unmodified Hessian",
        };
        write!(f, "{}", val)
    }
}

/// Source of the Hessian in the trust region methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HessianType {
    Bfgs,
    Newton,
}

impl fmt::Display for HessianType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HessianType::Bfgs => write!(f, "BFGS"),
            HessianType::Newton => write!(f, "Newton"),
        }
    }
}

/// A single algorithm option token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinOption {
    LineSearch(LineSearchKind),
    HessianMod(HessianModKind),
    HessianType(HessianType),
    /// "None" disables the Hessian modification first, then the line search
    Disable,
}

impl FromStr for MinOption {
    type Err = SimpleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "back" | "backtrack" | "backtracking" => {
                Ok(MinOption::LineSearch(LineSearchKind::Backtrack))
            }
            "nwi" | "nocedalwrightinterpolation" => {
                Ok(MinOption::LineSearch(LineSearchKind::NocedalWrightInterpol))
            }
            "wolfe" | "nww" | "nocedalwrightwolfe" => {
                Ok(MinOption::LineSearch(LineSearchKind::NocedalWrightWolfe))
            }
            "mt" | "morethuente" => Ok(MinOption::LineSearch(LineSearchKind::MoreThuente)),
            "gmw" | "gmw81" => Ok(MinOption::HessianMod(HessianModKind::Gmw)),
            "se99" | "se" => Ok(MinOption::HessianMod(HessianModKind::Se99)),
            "chol" | "cholesky" => Ok(MinOption::HessianMod(HessianModKind::AddedIdentity)),
            "bfgs" => Ok(MinOption::HessianType(HessianType::Bfgs)),
            "newton" | "ntn" => Ok(MinOption::HessianType(HessianType::Newton)),
            "none" => Ok(MinOption::Disable),
            _ => bail!("the minimisation option is not recognised"),
        }
    }
}

/// Line search configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineSearchParams {
    /// Initial step length
    pub a0: f64,
    /// Sufficient decrease constant
    pub mu: f64,
    /// Curvature constant
    pub eta: f64,
    /// Curvature constant for the nonlinear conjugate gradient methods
    pub eta_cg: f64,
    pub max_iter: usize,
}

impl Default for LineSearchParams {
    fn default() -> Self {
        Self {
            a0: 1.0,
            mu: 1e-4,
            eta: 0.9,
            eta_cg: 0.1,
            max_iter: 100,
        }
    }
}

impl LineSearchParams {
    /// 0 < mu < eta < 1 for both curvature constants and a positive initial step.
    pub fn validate(&self) -> Result<(), MinimizerError> {
        for eta in [self.eta, self.eta_cg] {
            if !(0.0 < self.mu && self.mu < eta && eta < 1.0) {
                return Err(init_error(format!(
                    "the line search constants must satisfy 0 < mu < eta < 1, mu = {} and eta = {} were given",
                    self.mu, eta
                )));
            }
        }
        if !(self.a0 > 0.0) || !self.a0.is_finite() {
            return Err(init_error(format!(
                "the initial step length {} must be positive",
                self.a0
            )));
        }
        if self.max_iter == 0 {
            return Err(init_error("the line search needs at least one iteration".to_string()));
        }
        Ok(())
    }
}

/// Trust region configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrustRegionParams {
    pub delta0: f64,
    pub delta_max: f64,
    /// Acceptance threshold on the reduction ratio
    pub eta: f64,
}

impl Default for TrustRegionParams {
    fn default() -> Self {
        Self {
            delta0: 1.0,
            delta_max: 1e5,
            eta: 1e-4,
        }
    }
}

impl TrustRegionParams {
    /// 0 < delta0 <= delta_max and 0 <= eta < 1/4
    pub fn validate(&self) -> Result<(), MinimizerError> {
        if !(self.delta0 > 0.0) || !(self.delta_max >= self.delta0) || !self.delta_max.is_finite() {
            return Err(init_error(format!(
                "the trust region radius {} must be positive and below {}",
                self.delta0, self.delta_max
            )));
        }
        if !(0.0..0.25).contains(&self.eta) {
            return Err(init_error(format!(
                "the trust region acceptance threshold {} must lie in [0, 0.25)",
                self.eta
            )));
        }
        Ok(())
    }
}

/// Levenberg-Marquardt configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LmParams {
    pub lambda0: f64,
}

impl Default for LmParams {
    fn default() -> Self {
        Self { lambda0: 1.0 }
    }
}

impl LmParams {
    pub fn validate(&self) -> Result<(), MinimizerError> {
        if !(self.lambda0 > 0.0) || !self.lambda0.is_finite() {
            return Err(init_error(format!(
                "the Levenberg-Marquardt damping {} must be positive",
                self.lambda0
            )));
        }
        Ok(())
    }
}

/// Method of multipliers configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MomParams {
    pub mu0: f64,
    pub epsilon0: f64,
    pub gamma0: f64,
    /// Initial Lagrange multipliers, zero when unset
    pub lambda0: Option<Array1<f64>>,
    /// Iteration ceiling of each inner minimisation
    pub inner_max_iterations: usize,
}

impl Default for MomParams {
    fn default() -> Self {
        Self {
            mu0: 1e-2,
            epsilon0: 1e5,
            gamma0: 1e5,
            lambda0: None,
            inner_max_iterations: 500,
        }
    }
}

impl MomParams {
    pub fn validate(&self) -> Result<(), MinimizerError> {
        for (name, value) in [("mu0", self.mu0), ("epsilon0", self.epsilon0), ("gamma0", self.gamma0)] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(init_error(format!(
                    "the method of multipliers parameter {} = {} must be positive",
                    name, value
                )));
            }
        }
        if self.inner_max_iterations == 0 {
            return Err(init_error(
                "the inner minimisation needs at least one iteration".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything the dispatcher needs besides the objective and the tolerances.
#[derive(Clone, Serialize)]
pub struct MinOptions {
    pub line_search: Option<LineSearchKind>,
    pub hessian_mod: Option<HessianModKind>,
    pub hessian_type: Option<HessianType>,
    /// Unconstrained algorithm nested in the method of multipliers
    pub inner: Option<Algorithm>,
    pub line_search_params: LineSearchParams,
    pub trust_region: TrustRegionParams,
    pub lm: LmParams,
    pub mom: MomParams,
    pub grid: Vec<GridAxis>,
    pub mach_acc: f64,
    #[serde(skip)]
    pub constraints: Vec<Box<dyn Constraint>>,
    #[serde(skip)]
    pub least_squares: Option<Box<dyn LeastSquaresFn>>,
}

impl Default for MinOptions {
    fn default() -> Self {
        MinOptions {
            line_search: None,
            hessian_mod: None,
            hessian_type: None,
            inner: None,
            line_search_params: LineSearchParams::default(),
            trust_region: TrustRegionParams::default(),
            lm: LmParams::default(),
            mom: MomParams::default(),
            grid: Vec::new(),
            mach_acc: 1e-16,
            constraints: Vec::new(),
            least_squares: None,
        }
    }
}

impl fmt::Debug for MinOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinOptions")
            .field("line_search", &self.line_search)
            .field("hessian_mod", &self.hessian_mod)
            .field("hessian_type", &self.hessian_type)
            .field("inner", &self.inner)
            .field("line_search_params", &self.line_search_params)
            .field("trust_region", &self.trust_region)
            .field("lm", &self.lm)
            .field("mom", &self.mom)
            .field("grid", &self.grid)
            .field("mach_acc", &self.mach_acc)
            .field("constraints", &self.constraints.len())
            .field("least_squares", &self.least_squares.is_some())
            .finish()
    }
}

fn init_error(msg: String) -> MinimizerError {
    MinimizerError::InitializationError(msg)
}

impl MinOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line_search(mut self, kind: LineSearchKind) -> Self {
        self.line_search = Some(kind);
        self
    }

    pub fn with_hessian_mod(mut self, kind: HessianModKind) -> Self {
        self.hessian_mod = Some(kind);
        self
    }

    pub fn with_hessian_type(mut self, kind: HessianType) -> Self {
        self.hessian_type = Some(kind);
        self
    }

    pub fn with_inner(mut self, algorithm: Algorithm) -> Self {
        self.inner = Some(algorithm);
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<Box<dyn Constraint>>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_least_squares<L>(mut self, data: L) -> Self
    where
        L: LeastSquaresFn + 'static,
    {
        self.least_squares = Some(Box::new(data));
        self
    }

    pub fn with_grid(mut self, grid: Vec<GridAxis>) -> Self {
        self.grid = grid;
        self
    }

    /// Apply one option token for the given algorithm.
    pub fn apply(&mut self, algorithm: Algorithm, option: MinOption) -> Result<(), MinimizerError> {
        match option {
            MinOption::LineSearch(kind) => {
                if self.line_search.is_some() {
                    return Err(init_error("more than one line search was given".to_string()));
                }
                self.line_search = Some(kind);
            }
            MinOption::HessianMod(kind) => {
                if self.hessian_mod.is_some() {
                    return Err(init_error(
                        "more than one Hessian modification was given".to_string(),
                    ));
                }
                self.hessian_mod = Some(kind);
            }
            MinOption::HessianType(kind) => {
                if self.hessian_type.is_some() {
                    return Err(init_error("more than one Hessian type was given".to_string()));
                }
                self.hessian_type = Some(kind);
            }
            MinOption::Disable => {
                if algorithm.accepts_hessian_mod() && self.hessian_mod.is_none() {
                    self.hessian_mod = Some(HessianModKind::NoMod);
                } else if self.line_search.is_none() {
                    self.line_search = Some(LineSearchKind::NoLineSearch);
                } else {
                    return Err(init_error("the 'None' option was given too often".to_string()));
                }
            }
        }
        Ok(())
    }

    /// Parse option tokens such as `["Back"]` or `["MoreThuente", "GMW"]`.
    ///
    /// For the method of multipliers the first token names the nested algorithm.
    pub fn parse(algorithm: Algorithm, tokens: &[&str]) -> Result<MinOptions, MinimizerError> {
        let mut options = MinOptions::default();
        let mut target = algorithm;
        let mut tokens = tokens;

        if algorithm == Algorithm::MethodOfMultipliers {
            let (first, rest) = tokens.split_first().ok_or_else(|| {
                init_error("the unconstrained minimisation algorithm has not been specified".to_string())
            })?;
            let inner: Algorithm = first.parse().map_err(|e: SimpleError| init_error(e.to_string()))?;
            options.inner = Some(inner);
            target = inner;
            tokens = rest;
        }

        for token in tokens {
            let option: MinOption = token
                .parse()
                .map_err(|e: SimpleError| init_error(format!("{}: '{}'", e, token)))?;
            options.apply(target, option)?;
        }
        Ok(options)
    }

    /// Reject option combinations the algorithm cannot honour.
    pub fn validate(&self, algorithm: Algorithm, has_hessian: bool) -> Result<(), MinimizerError> {
        if algorithm == Algorithm::MethodOfMultipliers {
            let inner = self.inner.ok_or_else(|| {
                init_error("the unconstrained minimisation algorithm has not been specified".to_string())
            })?;
            if !inner.is_unconstrained() {
                return Err(init_error(format!(
                    "{} cannot be used within the method of multipliers",
                    inner
                )));
            }
            if inner == Algorithm::LevenbergMarquardt {
                return Err(init_error(
                    "Levenberg-Marquardt cannot minimise the augmented Lagrangian".to_string(),
                ));
            }
            if self.constraints.is_empty() {
                return Err(init_error("the constraints have been incorrectly supplied".to_string()));
            }
            self.mom.validate()?;
            return self.validate_unconstrained(inner, has_hessian);
        }

        if !self.constraints.is_empty() {
            return Err(init_error(format!(
                "{} is unconstrained, use the method of multipliers with constraints",
                algorithm
            )));
        }
        self.validate_unconstrained(algorithm, has_hessian)
    }

    fn validate_unconstrained(&self, algorithm: Algorithm, has_hessian: bool) -> Result<(), MinimizerError> {
        if let Some(kind) = self.line_search {
            if !algorithm.accepts_line_search() {
                return Err(init_error(format!(
                    "{} does not use a line search, '{}' was given",
                    algorithm, kind
                )));
            }
        }

        if let Some(kind) = self.hessian_mod {
            if kind != HessianModKind::NoMod && !algorithm.accepts_hessian_mod() {
                return Err(init_error(format!(
                    "{} does not use a Hessian modification, '{}' was given",
                    algorithm, kind
                )));
            }
            if kind != HessianModKind::NoMod
                && algorithm == Algorithm::Dogleg
                && self.hessian_type == Some(HessianType::Bfgs)
            {
                return Err(init_error(
                    "the BFGS Hessian approximation cannot be modified".to_string(),
                ));
            }
        }

        if self.hessian_type.is_some() && !algorithm.is_trust_region() {
            return Err(init_error(format!(
                "{} does not take a Hessian type",
                algorithm
            )));
        }

        let needs_hessian = match algorithm {
            Algorithm::Newton | Algorithm::NewtonCg => true,
            a if a.is_trust_region() => self.hessian_type != Some(HessianType::Bfgs),
            _ => false,
        };
        if needs_hessian && !has_hessian {
            return Err(init_error(format!(
                "{} needs the Hessian, which the objective does not provide",
                algorithm
            )));
        }

        if algorithm == Algorithm::LevenbergMarquardt && self.least_squares.is_none() {
            return Err(init_error(
                "Levenberg-Marquardt needs the model Jacobian and measurement errors".to_string(),
            ));
        }

        if algorithm == Algorithm::Grid && self.grid.is_empty() {
            return Err(init_error("the grid search needs one axis per parameter".to_string()));
        }

        if algorithm.accepts_line_search() {
            self.line_search_params.validate()?;
        }
        if algorithm.is_trust_region() {
            self.trust_region.validate()?;
        }
        if algorithm == Algorithm::LevenbergMarquardt {
            self.lm.validate()?;
        }
        Ok(())
    }
}
