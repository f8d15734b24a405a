// Distributed under the MIT License
// (See accompanying LICENSE file or a copy at http://opensource.org/licenses/MIT)

//! Thin runner: loads a trusted input document, dispatches the primary
//! hot-water tank's heat sources over the simulation period and writes a
//! per-timestep CSV trace of the tank's state.
//!
//! Hot-water-event/schedule generation and the zone envelope finite
//! difference solve are external collaborators the library exposes traits
//! for ([`hem_core::zone::ZoneEnvelope`]) but does not itself implement;
//! driving a full dwelling simulation through those extension points is a
//! caller's job, not this binary's.

use std::fs::File;
use std::process::exit;

use hem_core::input::Input;

const APP_TITLE: &str = "hem-run";

fn get_help() -> String {
    format!(
        "Uso: {APP_TITLE} ARCHIVO_ENTRADA ARCHIVO_SALIDA_CSV

Argumentos:
    ARCHIVO_ENTRADA       Documento JSON de entrada, ya validado contra el esquema
    ARCHIVO_SALIDA_CSV    Ruta del CSV de traza del depósito a generar

Descripción:
    Ejecuta el despacho de las fuentes de calor del depósito de agua caliente
    primario a lo largo del periodo de simulación y vuelca su traza de
    temperaturas y estado de carga.
"
    )
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let (input_path, output_path) = match args.as_slice() {
        [_, input_path, output_path] => (input_path.clone(), output_path.clone()),
        _ => {
            eprintln!("{}", get_help());
            exit(exitcode::USAGE);
        }
    };

    let input = Input::from_path(&input_path).unwrap_or_else(|e| {
        eprintln!("ERROR: no se pudo cargar '{input_path}': {e:#}");
        exit(exitcode::DATAERR);
    });

    let mut tank = input.build_hot_water_tank();

    let out_file = File::create(&output_path).unwrap_or_else(|e| {
        eprintln!("ERROR: no se pudo crear '{output_path}': {e}");
        exit(exitcode::CANTCREAT);
    });
    let mut wtr = csv::WriterBuilder::new().from_writer(out_file);
    wtr.write_record(["timestep", "mean_temp_c", "state_of_charge"]).unwrap_or_else(|e| {
        eprintln!("ERROR: no se pudo escribir '{output_path}': {e}");
        exit(exitcode::IOERR);
    });

    let mut clock = input.simulation_time;
    while let Some(t) = clock.next() {
        let Some(tank) = tank.as_mut() else { break };
        tank.dispatch_heat_sources(&input.controls, &t, 55.0, 7.0);
        let mean_temp = tank.layer_temps.iter().sum::<f32>() / tank.layer_temps.len().max(1) as f32;
        let soc = tank.state_of_charge().map(|s| format!("{s:.4}")).unwrap_or_default();
        wtr.write_record([t.index.to_string(), format!("{mean_temp:.2}"), soc])
            .unwrap_or_else(|e| {
                eprintln!("ERROR: no se pudo escribir '{output_path}': {e}");
                exit(exitcode::IOERR);
            });
    }
    wtr.flush().unwrap_or_else(|e| {
        eprintln!("ERROR: no se pudo escribir '{output_path}': {e}");
        exit(exitcode::IOERR);
    });

    eprintln!("Resultados escritos en '{output_path}'");
}
