use npyz::WriterBuilder;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::HouseholdPopulation;
use crate::errors::{HouseholdError, Result};
use crate::solver::Trajectory;
use crate::stats::CompartmentSummary;

/// Writes solutions of the rate equations to an output directory.
///
/// * `trajectory.csv`: time and expected number of individuals per household for every
///   compartment and class.
/// * `final_state.npy`: the probability vector at the end of the integration.
/// * `states.npy`: the global state matrix.
/// * `which_composition.npy`: the composition of every global state.
pub struct TrajectoryWriter<'a> {
    population: &'a HouseholdPopulation,
    outdir: PathBuf,
}

impl<'a> TrajectoryWriter<'a> {
    pub fn new(outdir: &str, population: &'a HouseholdPopulation) -> Result<Self> {
        fs::create_dir_all(outdir)
            .map_err(|err| HouseholdError::WriteError(format!("Unable to create {outdir}: {err}")))?;
        Ok(Self {
            population,
            outdir: PathBuf::from(outdir),
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.outdir.join(name)
    }

    /// Column names of the trajectory CSV.
    pub fn header(&self) -> Vec<String> {
        let labels = self.population.variant().labels();
        std::iter::once("t".to_string())
            .chain(labels.iter().flat_map(|label| {
                (0..self.population.n_classes()).map(move |class| format!("{label}_{class}"))
            }))
            .collect()
    }

    pub fn write_trajectory(&self, trajectory: &Trajectory) -> Result<()> {
        let path = self.path("trajectory.csv");
        let file = create(&path)?;
        self.write_trajectory_to(trajectory, io::BufWriter::new(file))
    }

    pub fn write_trajectory_to(&self, trajectory: &Trajectory, writer: impl io::Write) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(self.header()).map_err(write_error)?;

        for (t, h) in trajectory.iter() {
            let counts = self.population.expected_counts(h);
            let record = std::iter::once(t.to_string())
                .chain(counts.iter().map(|value| value.to_string()));
            writer.write_record(record).map_err(write_error)?;
        }
        writer.flush().map_err(write_error)
    }

    pub fn write_final_state(&self, h: &[f64]) -> Result<()> {
        let file = create(&self.path("final_state.npy"))?;
        write_npy(
            &mut io::BufWriter::new(file),
            &[h.len() as u64],
            h.iter().copied(),
        )
    }

    pub fn write_states(&self) -> Result<()> {
        let states = self.population.states();
        let file = create(&self.path("states.npy"))?;
        write_npy(
            &mut io::BufWriter::new(file),
            &[states.nrows() as u64, states.ncols() as u64],
            states.iter().map(|&count| count as u64),
        )?;

        let file = create(&self.path("which_composition.npy"))?;
        write_npy(
            &mut io::BufWriter::new(file),
            &[self.population.len() as u64],
            self.population
                .which_composition()
                .iter()
                .map(|&idx| idx as u64),
        )
    }
}

fn create(path: &Path) -> Result<fs::File> {
    fs::File::create(path).map_err(|err| {
        HouseholdError::WriteError(format!("Unable to create {}: {err}", path.display()))
    })
}

fn write_error(err: impl std::fmt::Display) -> HouseholdError {
    HouseholdError::WriteError(format!("{err}"))
}

pub fn write_npy<T, I>(writer: &mut impl io::Write, shape: &[u64], data: I) -> Result<()>
where
    T: npyz::Serialize + npyz::AutoSerialize,
    I: IntoIterator<Item = T>,
{
    let mut npy_writer = npyz::WriteOptions::new()
        .default_dtype()
        .shape(shape)
        .writer(writer)
        .begin_nd()
        .map_err(write_error)?;
    npy_writer.extend(data).map_err(write_error)?;
    npy_writer.finish().map_err(write_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parameters;
    use crate::core::{CompositionList, ModelVariant};
    use crate::model::{make_initial_condition, transition_rule, ModelInput};

    fn population() -> HouseholdPopulation {
        let parameters = Parameters {
            sus: vec![1.],
            ..Default::default()
        };
        let input = ModelInput::single_class_seir(&Parameters {
            external_trans_scaling: 0.5,
            ..parameters
        })
        .unwrap();
        let list = CompositionList::from_counts(&[vec![1], vec![2]], vec![0.5, 0.5]).unwrap();
        HouseholdPopulation::build(list, &input, transition_rule(ModelVariant::Seir), None)
            .unwrap()
    }

    #[test]
    fn trajectory_csv() {
        let population = population();
        let tmp_dir = std::env::temp_dir().join("test_households_trajectory_csv");
        let writer = TrajectoryWriter::new(tmp_dir.to_str().unwrap(), &population).unwrap();
        assert_eq!(writer.header(), vec!["t", "S_0", "E_0", "I_0", "R_0"]);

        let h = make_initial_condition(&population, 0.).unwrap().to_vec();
        let mut trajectory = Trajectory::default();
        trajectory.push(0., h.clone());
        trajectory.push(1., h);

        let mut buffer = Vec::new();
        writer.write_trajectory_to(&trajectory, &mut buffer).unwrap();
        let content = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["t,S_0,E_0,I_0,R_0", "0,1.5,0,0,0", "1,1.5,0,0,0"]);
        std::fs::remove_dir_all(tmp_dir).unwrap();
    }

    #[test]
    fn npy_output() {
        let population = population();
        let tmp_dir = std::env::temp_dir().join("test_households_npy_output");
        let writer = TrajectoryWriter::new(tmp_dir.to_str().unwrap(), &population).unwrap();
        writer.write_states().unwrap();
        writer.write_final_state(&vec![0.25; population.len()]).unwrap();

        let bytes = std::fs::read(writer.path("states.npy")).unwrap();
        let npy_data = npyz::NpyFile::new(bytes.as_slice()).unwrap();
        assert_eq!(npy_data.shape(), &[population.len() as u64, 4]);
        let data: Vec<u64> = npy_data.data::<u64>().unwrap().map(|el| el.unwrap()).collect();
        assert_eq!(data[..4], [1, 0, 0, 0]);

        let bytes = std::fs::read(writer.path("final_state.npy")).unwrap();
        let npy_data = npyz::NpyFile::new(bytes.as_slice()).unwrap();
        let data: Vec<f64> = npy_data.data::<f64>().unwrap().map(|el| el.unwrap()).collect();
        assert_eq!(data, vec![0.25; population.len()]);
        std::fs::remove_dir_all(tmp_dir).unwrap();
    }
}
