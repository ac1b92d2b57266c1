// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#[cfg(any(feature = "cuda", feature = "hip"))]
fn build_gpu_code() {
    const DEFAULT_CUDA_ARCHES: &[u16] = &[60, 70, 80];
    const DEFAULT_CUDA_SMS: &[u16] = &[60, 61, 70, 75, 80, 86];

    println!("cargo:rerun-if-changed=src/gpu/correlate.cu");
    println!("cargo:rerun-if-changed=src/gpu/utils.cu");
    println!("cargo:rerun-if-changed=src/gpu/common.cuh");

    let mut gpu_target = cc::Build::new();
    gpu_target
        .cuda(true)
        .cudart("shared")
        .include("src/gpu/")
        .file("src/gpu/correlate.cu")
        .file("src/gpu/utils.cu");

    #[cfg(feature = "cuda")]
    {
        // Specify all of the SMs and compute levels to target, either from the
        // environment or a sensible default set.
        let arches: Vec<u16> = match std::env::var("FRINGECAST_CUDA_COMPUTE") {
            Ok(c) => vec![c
                .trim()
                .parse()
                .expect("FRINGECAST_CUDA_COMPUTE isn't a number")],
            Err(_) => DEFAULT_CUDA_ARCHES.to_vec(),
        };
        let sms: Vec<u16> = match std::env::var("FRINGECAST_CUDA_SM") {
            Ok(s) => vec![s.trim().parse().expect("FRINGECAST_CUDA_SM isn't a number")],
            Err(_) => DEFAULT_CUDA_SMS.to_vec(),
        };
        for arch in arches {
            gpu_target.flag(&format!("-gencode=arch=compute_{arch},code=compute_{arch}"));
        }
        for sm in sms {
            gpu_target.flag(&format!("-gencode=arch=compute_{sm},code=sm_{sm}"));
        }
    }

    #[cfg(feature = "hip")]
    {
        gpu_target.compiler(
            std::env::var("HIP_PATH")
                .map(|p| format!("{p}/bin/hipcc"))
                .unwrap_or_else(|_| "hipcc".to_string()),
        );
    }

    gpu_target.compile("fringecast_gpu");
}

#[cfg(all(feature = "cuda", feature = "hip"))]
compile_error!("Both 'cuda' and 'hip' features are enabled; only one may be used at a time.");

fn main() {
    #[cfg(any(feature = "cuda", feature = "hip"))]
    build_gpu_code();
}
