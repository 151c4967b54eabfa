use anyhow::Result;

use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use ndarray::Array1;
use std::sync::Arc;

use crate::args::Args;
use crate::config::Settings;
use crate::core::{AssemblyObserver, AssemblyProgress, CompositionList, HouseholdPopulation};
use crate::model::{
    make_initial_condition, make_initial_condition_with_recovereds, transition_rule, ModelInput,
    RateEquations,
};
use crate::readwrite::TrajectoryWriter;
use crate::solver::{IvpSolver, Rk4Solver, Trajectory};
use crate::stats::CompartmentSummary;

pub struct Runner {
    args: Args,
    settings: Settings,
    population: Arc<HouseholdPopulation>,
    equations: RateEquations,
    initial: Vec<f64>,
}

impl Runner {
    pub fn new(args: Args) -> Result<Runner> {
        Self::setup_logger(&args);
        #[cfg(feature = "parallel")]
        Self::setup_rayon(&args);

        let settings = Self::load_settings(&args.settings)?;
        let compositions = settings.households.load()?;
        log::info!(
            "Loaded {} compositions with average household size {:.3}",
            compositions.len(),
            compositions.average_household_size()
        );

        let input = Self::create_model_input(&settings, compositions.n_classes())?;
        let population = Arc::new(Self::assemble_population(
            &args,
            &settings,
            compositions,
            &input,
        )?);
        let equations = RateEquations::new(input, population.clone(), settings.epsilon)?;
        let initial = Self::create_initial_condition(&settings, &population)?.to_vec();

        Ok(Self {
            args,
            settings,
            population,
            equations,
            initial,
        })
    }

    pub fn start(&mut self) -> Result<()> {
        let trajectory = self.run()?;
        self.finish(&trajectory)
    }

    /// Setup logging level and file
    fn setup_logger(args: &Args) {
        let log_level = match args.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        simple_logging::log_to_file(args.log_file.as_str(), log_level).unwrap_or_else(|_| {
            eprintln!("Unable to open log file.");
            std::process::exit(1);
        });
    }

    /// Setup rayon thread pool
    #[cfg(feature = "parallel")]
    fn setup_rayon(args: &Args) {
        if let Some(n_threads) = args.threads {
            println!("Setting number of threads to {}.", n_threads);
            rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build_global()
                .unwrap_or_else(|_| {
                    eprintln!("Unable to set number of threads.");
                    std::process::exit(1);
                });
        }
    }

    /// Load settings from file
    fn load_settings(path: &str) -> Result<Settings> {
        let settings: Settings = Settings::read_from_file(path)?;
        log::info!("Loaded settings\n{}", settings);
        Ok(settings)
    }

    fn create_model_input(settings: &Settings, n_classes: usize) -> Result<ModelInput> {
        let input = ModelInput::from_parameters(
            settings.model,
            &settings.parameters,
            settings.contacts.as_ref(),
        )?
        .with_import_model(settings.imports.build(n_classes)?)?;
        log::debug!("Model input: {input:?}");
        Ok(input)
    }

    fn progress_bar(&self, length: u64) -> Option<ProgressBar> {
        create_progress_bar(self.args.disable_progress_bar, length)
    }

    fn assemble_population(
        args: &Args,
        settings: &Settings,
        compositions: CompositionList,
        input: &ModelInput,
    ) -> Result<HouseholdPopulation> {
        let bar = create_progress_bar(args.disable_progress_bar, compositions.len() as u64);
        let observer = |progress: AssemblyProgress| {
            if let Some(bar) = bar.as_ref() {
                bar.inc(1);
                bar.set_message(format!(
                    "composition {} with {} states",
                    progress.composition, progress.n_states
                ));
            }
        };

        let population = HouseholdPopulation::build(
            compositions,
            input,
            transition_rule(settings.model),
            Some(&observer as AssemblyObserver),
        )?;
        if let Some(bar) = bar {
            bar.finish_with_message(format!("{} states", population.len()));
        }
        Ok(population)
    }

    fn create_initial_condition(
        settings: &Settings,
        population: &HouseholdPopulation,
    ) -> Result<Array1<f64>> {
        let initial = &settings.initial;
        let h0 = match (initial.seroprevalence, initial.attack_ratio) {
            (Some(seroprevalence), attack_ratio) => make_initial_condition_with_recovereds(
                population,
                initial.prevalence,
                seroprevalence,
                attack_ratio.unwrap_or(1.),
            )?,
            (None, _) => make_initial_condition(population, initial.prevalence)?,
        };
        Ok(h0)
    }

    fn run(&self) -> Result<Trajectory> {
        let solver_settings = &self.settings.solver;
        let solver = Rk4Solver::new(solver_settings.step, solver_settings.output_every)?;
        let t_span = (0., solver_settings.t_end);

        let bar = self.progress_bar(solver.n_steps(t_span) as u64);
        let mut observer = |t: f64| {
            if let Some(bar) = bar.as_ref() {
                bar.inc(1);
                bar.set_message(format!("t={t:.2}"));
            }
        };

        log::info!(
            "Integrating {} states from t={} to t={} with step {}",
            self.population.len(),
            t_span.0,
            t_span.1,
            solver.step()
        );
        let equations = &self.equations;
        let mut rhs = |t: f64, h: &[f64]| equations.evaluate(t, h);
        let trajectory = solver.solve_observed(
            &mut rhs,
            t_span,
            &self.initial,
            &mut observer,
        )?;

        if let Some(bar) = bar {
            bar.finish();
        }
        Ok(trajectory)
    }

    fn finish(&self, trajectory: &Trajectory) -> Result<()> {
        log::info!("Storing output in {}...", self.args.outdir);
        let writer = TrajectoryWriter::new(&self.args.outdir, &self.population)?;
        self.settings
            .write_to_file(&writer.path("settings.yaml").to_string_lossy())?;
        writer.write_trajectory(trajectory)?;
        writer.write_states()?;

        if let Some((t, h)) = trajectory.last() {
            writer.write_final_state(h)?;

            let mass = self.population.composition_mass(h);
            let recovered = self
                .population
                .prevalence(h, self.population.variant().recovered());
            log::info!(
                r###"
        t={t}
        composition_mass={}
        attack_ratio={}"###,
                mass.iter().map(|m| format!("{m:.6}")).join(", "),
                recovered.iter().map(|r| format!("{r:.6}")).join(", ")
            );
        }
        log::info!("Finished.");
        Ok(())
    }
}

fn create_progress_bar(disabled: bool, length: u64) -> Option<ProgressBar> {
    match disabled {
        true => None,
        false => {
            let bar = ProgressBar::new(length);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "[{bar:40}] {pos:>7}/{len:7} [{elapsed_precise} / {duration_precise}] {msg}",
                    )
                    .expect("Unable to create template.")
                    .progress_chars("=> "),
            );
            Some(bar)
        }
    }
}
