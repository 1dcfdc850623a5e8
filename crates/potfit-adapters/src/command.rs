//! Calculador por proceso externo.
//!
//! Protocolo: por cada cálculo se lanza `program args...`, se escribe un
//! `CalculationRequest` en JSON por stdin y se cierra. El proceso debe
//! terminar con código 0 y dejar la energía (Hartree) en la última línea no
//! vacía de stdout, como número o como `{"energy": <número>}`.
//!
//! Si el programa no existe o no puede lanzarse, el error es de
//! infraestructura (detiene la corrida). Código de salida distinto de cero,
//! salida ilegible o timeout es un fallo de cálculo (la fila queda `failed`).
//! Al vencer el timeout el proceso se mata y se espera antes de seguir.

use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use potfit_core::{CalcSettings, Calculator, CalculatorError};
use potfit_domain::Structure;
use serde::{Deserialize, Serialize};

/// Cuerpo JSON enviado al programa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRequest {
    pub method_basis: String,
    pub counterpoise: bool,
    pub fragment_indices: Vec<usize>,
    pub charge: i32,
    pub spin_multiplicity: u32,
    /// Geometría de los fragmentos pedidos (con cp, la del complejo entero).
    pub xyz: String,
    pub structure: Structure,
    pub settings: CalcSettings,
}

impl CalculationRequest {
    pub fn new(structure: &Structure,
               fragment_indices: &[usize],
               method_basis: &str,
               counterpoise: bool,
               settings: &CalcSettings)
               -> Result<Self, CalculatorError> {
        let selected = structure.subset(fragment_indices)
                                .map_err(|e| CalculatorError::Computation(e.to_string()))?;
        let geometry = if counterpoise { structure } else { &selected };
        let charge = selected.fragments().iter().map(|f| f.charge).sum();
        // Multiplicidad de alto espín: suma de electrones desapareados.
        let unpaired: u32 = selected.fragments().iter().map(|f| f.spin_multiplicity.saturating_sub(1)).sum();
        Ok(Self { method_basis: method_basis.to_string(),
                  counterpoise,
                  fragment_indices: fragment_indices.to_vec(),
                  charge,
                  spin_multiplicity: unpaired + 1,
                  xyz: geometry.to_xyz(),
                  structure: structure.clone(),
                  settings: settings.clone() })
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct CommandCalculator {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

#[derive(Deserialize)]
struct EnergyLine {
    energy: f64,
}

/// Energía de la última línea no vacía de `stdout`.
pub fn parse_energy(stdout: &str) -> Option<f64> {
    let last = stdout.lines().map(str::trim).rev().find(|l| !l.is_empty())?;
    let energy = last.parse::<f64>()
                     .ok()
                     .or_else(|| serde_json::from_str::<EnergyLine>(last).ok().map(|l| l.energy))?;
    energy.is_finite().then_some(energy)
}

impl CommandCalculator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(),
               args: Vec::new(),
               timeout: None }
    }

    /// Tiempo máximo por cálculo; al vencer, el proceso se mata y la fila
    /// queda `failed`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_args<I, A>(mut self, args: I) -> Self
        where I: IntoIterator<Item = A>,
              A: Into<String>
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl Calculator for CommandCalculator {
    fn compute(&self,
               structure: &Structure,
               fragment_indices: &[usize],
               method_basis: &str,
               counterpoise: bool,
               settings: &CalcSettings)
               -> Result<f64, CalculatorError> {
        let request = CalculationRequest::new(structure, fragment_indices, method_basis, counterpoise, settings)?;
        let body = serde_json::to_vec(&request).map_err(|e| CalculatorError::Computation(format!("request: {e}")))?;
        debug!("command:start program={} structure={} fragments={fragment_indices:?} method_basis={method_basis}",
               self.program.display(),
               structure.name());

        let mut child = Command::new(&self.program).args(&self.args)
                                                   .stdin(Stdio::piped())
                                                   .stdout(Stdio::piped())
                                                   .stderr(Stdio::piped())
                                                   .spawn()
                                                   .map_err(|e| {
                                                       CalculatorError::Infrastructure(format!("cannot start {}: {e}",
                                                                                               self.program.display()))
                                                   })?;
        // Pipes atendidos en hilos: el hijo nunca queda bloqueado en una
        // escritura mientras esperamos su fin (o el timeout).
        let stdin_writer = feed(child.stdin.take(), body);
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let status = self.wait(&mut child)?;
        match stdin_writer.join() {
            // Un programa que no lee stdin cierra el pipe: no es un error.
            Ok(Err(e)) if e.kind() != ErrorKind::BrokenPipe => {
                return Err(CalculatorError::Infrastructure(format!("writing request: {e}")));
            }
            _ => {}
        }
        let output = Finished { status,
                                stdout: stdout_reader.join().unwrap_or_default(),
                                stderr: stderr_reader.join().unwrap_or_default() };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("no stderr output");
            return Err(CalculatorError::Computation(format!("{} exited with {}: {}",
                                                            self.program.display(),
                                                            output.status,
                                                            detail.trim())));
        }
        let energy = parse_energy(&stdout).ok_or_else(|| {
                                              CalculatorError::Computation(format!("no energy in output of {}",
                                                                                   self.program.display()))
                                          })?;
        debug!("command:done structure={} energy={energy}", structure.name());
        Ok(energy)
    }
}

struct Finished {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

fn feed<W: Write + Send + 'static>(pipe: Option<W>, body: Vec<u8>) -> JoinHandle<std::io::Result<()>> {
    thread::spawn(move || match pipe {
        // El pipe se cierra al salir del hilo: el hijo ve EOF.
        Some(mut pipe) => pipe.write_all(&body),
        None => Ok(()),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn kill_and_reap(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    let _ = child.kill();
    let _ = child.wait();
}

impl CommandCalculator {
    fn wait(&self, child: &mut Child) -> Result<ExitStatus, CalculatorError> {
        let waiting_failed = |e: std::io::Error| {
            CalculatorError::Infrastructure(format!("waiting for {}: {e}", self.program.display()))
        };
        let Some(limit) = self.timeout else {
            return child.wait().map_err(waiting_failed);
        };
        let deadline = Instant::now() + limit;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    kill_and_reap(child);
                    warn!("command:timeout program={} limit={limit:?}", self.program.display());
                    return Err(CalculatorError::Computation(format!("{} timed out after {limit:?}",
                                                                    self.program.display())));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    kill_and_reap(child);
                    return Err(waiting_failed(e));
                }
            }
        }
    }
}
