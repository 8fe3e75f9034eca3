use argh::FromArgs;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

use superq::estimator::{EstimatorConfig, SuperqEstimator};
use superq::model::{PointCloud, Superquadric};
use superq::vis::{GraspPose, Scene};

#[derive(FromArgs)]
/// Fit a superquadric to a synthetic noisy point cloud
struct Args {
    /// path to a JSON estimator configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// object class tag, overrides the configuration
    #[argh(option)]
    object_class: Option<String>,

    /// parameters of the sampled superquadric: a1,a2,a3,e1,e2,cx,cy,cz,phi,theta,psi
    #[argh(
        option,
        default = "String::from(\"0.06,0.04,0.1,0.2,0.2,0.3,0.0,0.1,0.4,0.3,0.0\")"
    )]
    params: String,

    /// half width of the uniform noise added to the points
    #[argh(option, default = "0.002")]
    noise: f64,

    /// seed of the random generator
    #[argh(option, default = "0")]
    seed: u64,

    /// path where the scene is written as JSON
    #[argh(option)]
    scene_out: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => EstimatorConfig::from_json_file(path)?,
        None => EstimatorConfig::default(),
    };
    if let Some(class) = args.object_class {
        config.object_class = class;
    }

    let params = args
        .params
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()?;
    let truth = Superquadric::from_params(&params)?;
    println!("Sampled superquadric: {:?}", truth.params());

    let mut rng = StdRng::seed_from_u64(args.seed);
    let points = truth
        .sample_surface(20, 40)
        .into_iter()
        .map(|p| p.map(|v| v + args.noise * rng.random_range(-1.0..=1.0)))
        .collect::<Vec<_>>();
    let cloud = PointCloud::new(points, None);
    println!("Point cloud: #{} points", cloud.len());

    let estimator = SuperqEstimator::new(config)?;
    let fit = estimator.fit(&cloud);
    println!("Fit status: {}", fit.status);
    println!("Fit cost: {:e} after {} iterations", fit.cost, fit.iterations);
    println!("Fitted superquadric: {:?}", fit.superquadric.params());

    let mut scene = Scene::new();
    scene.add_points(&cloud, false, 3);
    scene.add_superquadrics(&[fit.superquadric]);
    scene.add_poses(&[GraspPose::new(fit.superquadric.pose(), fit.cost, "right")]);

    if let Some(path) = args.scene_out {
        std::fs::write(&path, serde_json::to_string_pretty(&scene)?)?;
        log::info!("scene written to {}", path.display());
    }

    Ok(())
}
